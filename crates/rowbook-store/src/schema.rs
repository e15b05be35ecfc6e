//! Sheet provisioning: lazy per-class sheet creation with a header row.

use log::debug;
use rowbook_model::{Document, Sheet, HEADER_STYLE_NAME};

use crate::error::{Result, StoreError};
use crate::layout::ColumnLayout;

/// The sheet named `name`, creating it with a header row on first use.
pub fn ensure_sheet<'a>(
    doc: &'a mut Document,
    name: &str,
    layout: &ColumnLayout,
) -> Result<&'a mut Sheet> {
    if !doc.has_sheet(name) {
        create_sheet(doc, name, layout)?;
    }
    doc.sheet_mut(name)
        .ok_or_else(|| StoreError::Store(format!("sheet {name} vanished after creation")))
}

/// Create the sheet for a class, writing its header row. Creating a sheet
/// that already exists is a no-op.
pub fn create_sheet(doc: &mut Document, name: &str, layout: &ColumnLayout) -> Result<()> {
    let Some(sheet) = doc.add_sheet(name) else {
        return Ok(());
    };
    debug!("creating sheet {name} with {} columns", layout.column_names().len());
    let header = sheet.append_row();
    let row = sheet
        .row_mut(header)
        .ok_or_else(|| StoreError::Store(format!("header row missing in new sheet {name}")))?;
    row.set_style_name(HEADER_STYLE_NAME);
    for (&position, column_name) in layout.column_names() {
        row.cell_mut(position).set_string(column_name.clone());
    }
    Ok(())
}

/// Drop the sheet for a class, returning whether it existed.
pub fn delete_sheet(doc: &mut Document, name: &str) -> bool {
    let existed = doc.remove_sheet(name);
    if existed {
        debug!("deleted sheet {name}");
    }
    existed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ConverterRegistry;
    use crate::meta::{ClassMeta, FieldMeta, FieldType, IdentityKind, MetaRegistry};

    fn layout() -> ColumnLayout {
        let mut registry = MetaRegistry::new();
        let class = registry.register(ClassMeta::new(
            "P",
            IdentityKind::Datastore,
            vec![
                FieldMeta::scalar("name", FieldType::String),
                FieldMeta::scalar("age", FieldType::I64),
            ],
        ));
        ColumnLayout::build(&registry, class, &ConverterRegistry::new()).unwrap()
    }

    #[test]
    fn first_use_creates_header_row() {
        let mut doc = Document::new();
        let layout = layout();
        let sheet = ensure_sheet(&mut doc, "P", &layout).unwrap();

        assert_eq!(sheet.row_count(), 1);
        assert_eq!(sheet.data_row_count(), 0);
        let header = sheet.row(0).unwrap();
        assert_eq!(header.style_name(), Some(HEADER_STYLE_NAME));
        assert_eq!(header.cell(0).and_then(|c| c.string()), Some("name"));
        assert_eq!(header.cell(1).and_then(|c| c.string()), Some("age"));
        assert_eq!(header.cell(2).and_then(|c| c.string()), Some("ID"));
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut doc = Document::new();
        let layout = layout();
        ensure_sheet(&mut doc, "P", &layout).unwrap();
        ensure_sheet(&mut doc, "P", &layout).unwrap();
        assert_eq!(doc.sheets().count(), 1);
        assert_eq!(doc.sheet("P").unwrap().row_count(), 1);
    }
}
