use std::sync::Arc;
use tracing::warn;
use crate::core::error::Result;
use crate::core::types::{DocId, Document, FieldValue};
use crate::view::schema::ViewSchema;

/// Projects a document into zero or more rows of a view.
pub trait Mapper: Send + Sync {
    fn map(&self, api: &mut MapperApi, docid: DocId, doc: &Document) -> Result<()>;
}

impl<F> Mapper for F
where
    F: Fn(&mut MapperApi, DocId, &Document) -> Result<()> + Send + Sync,
{
    fn map(&self, api: &mut MapperApi, docid: DocId, doc: &Document) -> Result<()> {
        self(api, docid, doc)
    }
}

/// Rows emitted for one document id.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub docid: DocId,
    pub rows: Vec<Vec<FieldValue>>,
}

/// Handed to a mapper to collect its output.
pub struct MapperApi<'a> {
    schema: &'a ViewSchema,
    batches: Vec<RowBatch>,
    rolled_back: bool,
}

impl<'a> MapperApi<'a> {
    pub fn new(schema: &'a ViewSchema) -> Self {
        MapperApi {
            schema,
            batches: Vec::new(),
            rolled_back: false,
        }
    }

    /// Emit a row of column values in schema order (docid excluded). Missing
    /// trailing values are null.
    pub fn emit<I, V>(&mut self, docid: DocId, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let width = self.schema.columns.len();
        let mut row: Vec<FieldValue> = values.into_iter().map(Into::into).collect();
        if row.len() > width {
            warn!("View '{}': dropping {} extra values", self.schema.name, row.len() - width);
        }
        row.resize(width, FieldValue::Null);
        self.push(docid, row);
    }

    /// Emit a row whose columns are taken from the document's fields by name.
    pub fn emit_object(&mut self, docid: DocId, doc: &Document) {
        let row = self.schema.columns.iter()
            .map(|column| {
                doc.get_field(&column.name)
                    .or_else(|| {
                        doc.fields.iter()
                            .find(|(name, _)| name.eq_ignore_ascii_case(&column.name))
                            .map(|(_, v)| v)
                    })
                    .cloned()
                    .unwrap_or(FieldValue::Null)
            })
            .collect();
        self.push(docid, row);
    }

    /// Abort the insert; nothing emitted so far is kept.
    pub fn rollback(&mut self) {
        self.rolled_back = true;
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    pub fn into_batches(self) -> Vec<RowBatch> {
        self.batches
    }

    fn push(&mut self, docid: DocId, row: Vec<FieldValue>) {
        match self.batches.iter_mut().find(|b| b.docid == docid) {
            Some(batch) => batch.rows.push(row),
            None => self.batches.push(RowBatch { docid, rows: vec![row] }),
        }
    }
}

/// A registered view: schema, mapper and indexing policy.
#[derive(Clone)]
pub struct View {
    pub name: String,
    pub description: String,
    pub schema: ViewSchema,
    pub mapper: Option<Arc<dyn Mapper>>,
    pub is_primary_list: bool,
    pub is_active: bool,
    pub background_indexing: bool,
    pub delete_before_insert: bool,
    pub version: u32,
    pub fire_on_types: Vec<String>,
    pub full_text_columns: Vec<String>,
    pub case_insensitive_columns: Vec<String>,
}

impl View {
    pub fn new(schema: ViewSchema) -> Self {
        View {
            name: schema.name.clone(),
            description: String::new(),
            schema,
            mapper: None,
            is_primary_list: false,
            is_active: true,
            background_indexing: false,
            delete_before_insert: true,
            version: 1,
            fire_on_types: Vec::new(),
            full_text_columns: Vec::new(),
            case_insensitive_columns: Vec::new(),
        }
    }

    pub fn with_mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary_list = true;
        self
    }

    pub fn fire_on(mut self, doc_type: &str) -> Self {
        self.fire_on_types.push(doc_type.to_string());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn full_text(mut self, column: &str) -> Self {
        self.full_text_columns.push(column.to_string());
        self
    }

    pub fn case_insensitive(mut self, column: &str) -> Self {
        self.case_insensitive_columns.push(column.to_string());
        self
    }

    pub fn background(mut self) -> Self {
        self.background_indexing = true;
        self
    }

    pub fn keep_previous_rows(mut self) -> Self {
        self.delete_before_insert = false;
        self
    }

    pub fn fires_on(&self, doc_type: &str) -> bool {
        self.fire_on_types.iter().any(|t| t.eq_ignore_ascii_case(doc_type))
    }

    /// Schema with the view-level column overrides applied.
    pub fn effective_schema(&self) -> ViewSchema {
        let mut schema = self.schema.clone();
        schema.name = self.name.clone();
        schema.apply_overrides(&self.full_text_columns, &self.case_insensitive_columns);
        schema
    }
}
