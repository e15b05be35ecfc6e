use serde::{Deserialize, Serialize};

use crate::Cell;

/// One row of a sheet: a growable list of cells plus an optional default
/// style name.
///
/// The style name is carried purely as a sentinel; a row whose style equals
/// the reserved header constant is never treated as data (see
/// [`crate::HEADER_STYLE_NAME`]).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub struct Row {
    #[serde(default)]
    cells: Vec<Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style_name: Option<String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cell at `index`, if one has been materialized there.
    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Mutable access to the cell at `index`, growing the row with empty
    /// cells as needed.
    pub fn cell_mut(&mut self, index: usize) -> &mut Cell {
        if index >= self.cells.len() {
            self.cells.resize_with(index + 1, Cell::new);
        }
        &mut self.cells[index]
    }

    /// Number of materialized cells (trailing unset columns are not counted).
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    pub fn style_name(&self) -> Option<&str> {
        self.style_name.as_deref()
    }

    pub fn set_style_name(&mut self, name: impl Into<String>) {
        self.style_name = Some(name.into());
    }
}
