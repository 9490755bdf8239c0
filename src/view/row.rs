use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::{DocId, FieldValue};
use crate::view::schema::ViewSchema;

/// One row of a view as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub docid: DocId,
    pub fields: Vec<(String, FieldValue)>,
}

impl ViewRow {
    /// Column value by name, case-insensitive.
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.fields.iter().map(|(_, value)| value)
    }
}

/// Typed view of a row, for callers that want their own struct back.
pub trait FromRow: Sized {
    fn from_row(row: &ViewRow) -> Result<Self>;
}

impl FromRow for ViewRow {
    fn from_row(row: &ViewRow) -> Result<Self> {
        Ok(row.clone())
    }
}

/// Turns stored tuples into [`ViewRow`]s. Column names are resolved once
/// per view instead of once per row.
#[derive(Debug, Clone)]
pub struct RowFiller {
    columns: Arc<[String]>,
}

impl RowFiller {
    pub fn new(schema: &ViewSchema) -> Self {
        RowFiller {
            columns: schema.columns.iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// `tuple[0]` is the docid, the rest follow schema order.
    pub fn fill(&self, tuple: Vec<FieldValue>) -> Result<ViewRow> {
        let mut values = tuple.into_iter();
        let docid = match values.next() {
            Some(FieldValue::Guid(id)) => DocId(id),
            other => return Err(Error::corruption(format!("Row without docid: {:?}", other))),
        };

        let fields = self.columns.iter()
            .cloned()
            .zip(values.chain(std::iter::repeat(FieldValue::Null)))
            .collect();
        Ok(ViewRow { docid, fields })
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<ViewRow> {
        let tuple: Vec<FieldValue> = bincode::deserialize(bytes)
            .map_err(|e| Error::corruption(format!("Undecodable view row: {}", e)))?;
        self.fill(tuple)
    }

    pub fn encode(docid: DocId, values: &[FieldValue]) -> Result<Vec<u8>> {
        let mut tuple = Vec::with_capacity(values.len() + 1);
        tuple.push(FieldValue::Guid(docid.0));
        tuple.extend_from_slice(values);
        Ok(bincode::serialize(&tuple)?)
    }
}

/// Result of a view query. `total_count` counts every match, `count` only the
/// rows returned after paging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub ok: bool,
    pub total_count: usize,
    pub count: usize,
    pub rows: Vec<ViewRow>,
}

impl QueryResult {
    pub fn new(total_count: usize, rows: Vec<ViewRow>) -> Self {
        QueryResult {
            ok: true,
            total_count,
            count: rows.len(),
            rows,
        }
    }

    pub fn empty() -> Self {
        QueryResult::new(0, Vec::new())
    }

    pub fn rows_as<T: FromRow>(&self) -> Result<Vec<T>> {
        self.rows.iter().map(T::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::schema::ColumnType;

    struct Invoice {
        serial: i64,
    }

    impl FromRow for Invoice {
        fn from_row(row: &ViewRow) -> Result<Self> {
            match row.get("serial") {
                Some(FieldValue::Integer(serial)) => Ok(Invoice { serial: *serial }),
                other => Err(Error::invalid_input(format!("serial: {:?}", other))),
            }
        }
    }

    #[test]
    fn encoded_rows_fill_back() {
        let schema = ViewSchema::new("Invoices")
            .column("Name", ColumnType::Text)
            .column("Serial", ColumnType::Integer);
        let filler = RowFiller::new(&schema);
        let id = DocId::new();

        let bytes = RowFiller::encode(id, &[FieldValue::from("acme")]).unwrap();
        let row = filler.decode(&bytes).unwrap();
        assert_eq!(row.docid, id);
        assert_eq!(row.get("NAME"), Some(&FieldValue::from("acme")));
        assert_eq!(row.get("Serial"), Some(&FieldValue::Null));
    }

    #[test]
    fn typed_rows() {
        let row = ViewRow {
            docid: DocId::new(),
            fields: vec![("Serial".to_string(), FieldValue::Integer(7))],
        };
        let result = QueryResult::new(3, vec![row]);
        assert_eq!(result.count, 1);
        assert_eq!(result.rows_as::<Invoice>().unwrap()[0].serial, 7);
    }
}
