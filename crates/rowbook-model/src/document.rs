use serde::{Deserialize, Serialize};

use crate::Sheet;

fn default_schema_version() -> u32 {
    crate::SCHEMA_VERSION
}

/// A grid document: an ordered set of uniquely named sheets.
///
/// Sheet names are derived table identifiers rather than user-facing labels,
/// so lookup is case-sensitive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Serialization schema version.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    sheets: Vec<Sheet>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            schema_version: crate::SCHEMA_VERSION,
            sheets: Vec::new(),
        }
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name() == name)
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet(name).is_some()
    }

    /// Add an empty sheet with the given name, returning a mutable handle.
    /// Returns `None` if a sheet with this name already exists.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> Option<&mut Sheet> {
        let name = name.into();
        if self.has_sheet(&name) {
            return None;
        }
        self.sheets.push(Sheet::new(name));
        self.sheets.last_mut()
    }

    /// Remove the named sheet, returning whether it existed.
    pub fn remove_sheet(&mut self, name: &str) -> bool {
        let Some(idx) = self.sheets.iter().position(|s| s.name() == name) else {
            return false;
        };
        self.sheets.remove(idx);
        true
    }

    pub fn sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter()
    }
}
