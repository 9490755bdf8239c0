use serde::{Serialize, Deserialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::core::error::{Error, ErrorKind, Result};

/// 128-bit document identifier. Always column 0 of every view row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub Uuid);

impl DocId {
    pub fn new() -> Self {
        DocId(Uuid::new_v4())
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl Default for DocId {
    fn default() -> Self {
        DocId::new()
    }
}

impl From<Uuid> for DocId {
    fn from(id: Uuid) -> Self {
        DocId(id)
    }
}

impl FromStr for DocId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(DocId(Uuid::parse_str(s.trim())?))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Guid(Uuid),
    List(Vec<FieldValue>),
    Object(HashMap<String, FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value. Strings stay text; typed columns coerce them later.
    pub fn from_json(value: serde_json::Value) -> FieldValue {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(FieldValue::from_json).collect()),
            Value::Object(map) => FieldValue::Object(
                map.into_iter().map(|(k, v)| (k, FieldValue::from_json(v))).collect()
            ),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            FieldValue::Guid(g) => write!(f, "{}", g),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            FieldValue::Object(map) => {
                let mut parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                parts.sort();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Date(d)
    }
}

impl From<Uuid> for FieldValue {
    fn from(g: Uuid) -> Self {
        FieldValue::Guid(g)
    }
}

/// Schemaless document. `doc_type` routes it to the views that fire on that type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub doc_type: String,
    pub fields: HashMap<String, FieldValue>,
}

impl Document {
    pub fn new(id: DocId, doc_type: impl Into<String>) -> Self {
        Document {
            id,
            doc_type: doc_type.into(),
            fields: HashMap::new(),
        }
    }

    pub fn add_field(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Build a document from a JSON object, e.g. one received from an HTTP client.
    pub fn from_json(id: DocId, doc_type: &str, json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        match FieldValue::from_json(value) {
            FieldValue::Object(fields) => Ok(Document {
                id,
                doc_type: doc_type.to_string(),
                fields,
            }),
            _ => Err(Error::new(ErrorKind::InvalidInput, "Document JSON must be an object".to_string())),
        }
    }

    /// All string content, used by the document-level full-text index.
    pub fn text_content(&self) -> String {
        let mut names: Vec<&String> = self.fields.keys().collect();
        names.sort();

        let mut parts = Vec::new();
        for name in names {
            collect_text(&self.fields[name], &mut parts);
        }
        parts.join(" ")
    }
}

fn collect_text(value: &FieldValue, out: &mut Vec<String>) {
    match value {
        FieldValue::Text(s) => out.push(s.clone()),
        FieldValue::List(items) => items.iter().for_each(|v| collect_text(v, out)),
        FieldValue::Object(map) => map.values().for_each(|v| collect_text(v, out)),
        _ => {}
    }
}
