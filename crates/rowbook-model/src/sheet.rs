use serde::{Deserialize, Serialize};

use crate::Row;

/// Reserved row style marking a header row. Rows carrying this style hold
/// column labels and are skipped by every data-level scan and count.
pub const HEADER_STYLE_NAME: &str = "RB_Headers";

/// A named, ordered collection of rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    name: String,
    #[serde(default)]
    rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an empty row and return its index.
    pub fn append_row(&mut self) -> usize {
        self.rows.push(Row::new());
        self.rows.len() - 1
    }

    /// Remove the row at `index`. Out-of-range indices are a no-op returning
    /// `false`.
    pub fn remove_row(&mut self, index: usize) -> bool {
        if index < self.rows.len() {
            self.rows.remove(index);
            true
        } else {
            false
        }
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index)
    }

    /// All rows, headers included. Callers resolving object data should use
    /// [`Sheet::data_rows`] instead.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Total row count, headers included.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows that hold object data, with their sheet-level indices. Header
    /// rows (style [`HEADER_STYLE_NAME`]) are skipped.
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !is_header(row))
    }

    /// Number of data rows (header rows excluded).
    pub fn data_row_count(&self) -> usize {
        self.data_rows().count()
    }
}

fn is_header(row: &Row) -> bool {
    row.style_name() == Some(HEADER_STYLE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_rows_skip_header() {
        let mut sheet = Sheet::new("t");
        let header = sheet.append_row();
        sheet
            .row_mut(header)
            .unwrap()
            .set_style_name(HEADER_STYLE_NAME);
        sheet.append_row();
        sheet.append_row();
        sheet.append_row();

        assert_eq!(sheet.row_count(), 4);
        assert_eq!(sheet.data_row_count(), 3);
        assert!(sheet.data_rows().all(|(i, _)| i != header));
    }

    #[test]
    fn remove_row_shifts_indices() {
        let mut sheet = Sheet::new("t");
        sheet.append_row();
        let second = sheet.append_row();
        sheet.row_mut(second).unwrap().cell_mut(0).set_number(2.0);

        assert!(sheet.remove_row(0));
        assert_eq!(sheet.row_count(), 1);
        assert_eq!(
            sheet.row(0).and_then(|r| r.cell(0)).and_then(|c| c.number()),
            Some(2.0)
        );
        assert!(!sheet.remove_row(5));
    }
}
