//! Block-allocating sequence generator backed by a two-column sheet.
//!
//! The sheet holds one row per sequence: column 0 the sequence name,
//! column 1 the next unallocated value. `next` serves values out of a
//! reserved block and only touches the sheet when the block is exhausted,
//! so a block size above one trades gaps after a discarded document for
//! fewer row scans.

use std::collections::HashMap;

use log::debug;
use rowbook_model::{Document, HEADER_STYLE_NAME};

use crate::error::{Result, StoreError};

/// Default name of the sequence sheet.
pub const SEQUENCE_SHEET: &str = "IncrementTable";

struct Block {
    next: i64,
    remaining: i64,
}

/// Surrogate-key source for datastore-identity classes.
pub struct IncrementGenerator {
    sheet_name: String,
    block_size: i64,
    blocks: HashMap<String, Block>,
}

impl Default for IncrementGenerator {
    fn default() -> Self {
        Self::new(SEQUENCE_SHEET)
    }
}

impl IncrementGenerator {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            block_size: 1,
            blocks: HashMap::new(),
        }
    }

    /// Number of values reserved from the sheet per refill. Clamped to at
    /// least one.
    pub fn with_block_size(mut self, block_size: i64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Next value of `sequence`, reserving a fresh block when the cached
    /// one is spent. Sequences start at 1.
    pub fn next(&mut self, doc: &mut Document, sequence: &str) -> Result<i64> {
        let spent = self
            .blocks
            .get(sequence)
            .map_or(true, |block| block.remaining == 0);
        if spent {
            let start = self.reserve(doc, sequence)?;
            self.blocks.insert(
                sequence.to_string(),
                Block {
                    next: start,
                    remaining: self.block_size,
                },
            );
        }
        let block = self
            .blocks
            .get_mut(sequence)
            .ok_or_else(|| StoreError::Store("sequence block missing after reserve".into()))?;
        let value = block.next;
        block.next += 1;
        block.remaining -= 1;
        Ok(value)
    }

    /// Advance the stored next-value by one block, returning the block's
    /// first value. Creates the sheet and the sequence row on first use.
    fn reserve(&mut self, doc: &mut Document, sequence: &str) -> Result<i64> {
        if !doc.has_sheet(&self.sheet_name) {
            let sheet = doc.add_sheet(self.sheet_name.clone()).ok_or_else(|| {
                StoreError::Store(format!("failed to create sequence sheet {}", self.sheet_name))
            })?;
            let header = sheet.append_row();
            let row = sheet.row_mut(header).ok_or_else(|| {
                StoreError::Store("header row missing in new sequence sheet".into())
            })?;
            row.set_style_name(HEADER_STYLE_NAME);
            row.cell_mut(0).set_string("SEQUENCE");
            row.cell_mut(1).set_string("NEXT");
        }
        let sheet = doc
            .sheet_mut(&self.sheet_name)
            .ok_or_else(|| StoreError::Store(format!("sequence sheet {} missing", self.sheet_name)))?;

        let existing = sheet
            .data_rows()
            .find(|(_, row)| row.cell(0).and_then(|c| c.string()) == Some(sequence))
            .map(|(index, _)| index);

        let index = match existing {
            Some(index) => index,
            None => {
                let index = sheet.append_row();
                let row = sheet.row_mut(index).ok_or_else(|| {
                    StoreError::Store("sequence row missing after append".into())
                })?;
                row.cell_mut(0).set_string(sequence);
                row.cell_mut(1).set_number(1.0);
                index
            }
        };

        let row = sheet
            .row_mut(index)
            .ok_or_else(|| StoreError::Store("sequence row vanished mid-reserve".into()))?;
        let current = row
            .cell(1)
            .and_then(|c| c.number())
            .ok_or_else(|| StoreError::Store(format!("sequence {sequence} has no numeric value")))?
            as i64;
        row.cell_mut(1).set_number((current + self.block_size) as f64);
        debug!("reserved block [{current}, {}) for sequence {sequence}", current + self.block_size);
        Ok(current)
    }
}
