use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};

pub const DOCID_COLUMN: &str = "docid";

/// Semantic type of a view column; picks the index variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Guid,
    Text,
    FullText,
    Integer,
    Float,
    Boolean,
    Date,
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub case_insensitive: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            column_type,
            case_insensitive: false,
        }
    }
}

/// Ordered column list of a view. `docid` is implicit and always sits at
/// position 0 of a stored row, ahead of these columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSchema {
    pub name: String,
    pub columns: Vec<Column>,
}

impl ViewSchema {
    pub fn new(name: impl Into<String>) -> Self {
        ViewSchema {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(Column::new(name, column_type));
        self
    }

    /// Position of `name` within a stored row (docid = 0).
    pub fn position(&self, name: &str) -> Option<usize> {
        if name.eq_ignore_ascii_case(DOCID_COLUMN) {
            return Some(0);
        }
        self.columns.iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .map(|i| i + 1)
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(DOCID_COLUMN)
            .chain(self.columns.iter().map(|c| c.name.as_str()))
            .collect()
    }

    /// Apply the view-level full-text and case-insensitive column lists.
    pub fn apply_overrides(&mut self, full_text: &[String], case_insensitive: &[String]) {
        for column in &mut self.columns {
            if full_text.iter().any(|n| n.eq_ignore_ascii_case(&column.name)) {
                column.column_type = ColumnType::FullText;
            }
            if case_insensitive.iter().any(|n| n.eq_ignore_ascii_case(&column.name)) {
                column.case_insensitive = true;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_input("View schema needs a name"));
        }
        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            let lower = column.name.to_lowercase();
            if lower == DOCID_COLUMN {
                return Err(Error::invalid_input(format!("'{}' is reserved", DOCID_COLUMN)));
            }
            if !seen.insert(lower) {
                return Err(Error::invalid_input(format!("Duplicate column '{}'", column.name)));
            }
        }
        Ok(())
    }
}
