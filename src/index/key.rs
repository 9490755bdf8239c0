use std::cmp::Ordering;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::core::error::{Error, Result};
use crate::core::types::FieldValue;
use crate::view::schema::ColumnType;

/// A non-null, column-typed index key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexKey {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Date(DateTime<Utc>),
    Guid(Uuid),
    Text(String),
}

impl IndexKey {
    /// Convert a field value to the key type of a column. `Ok(None)` for
    /// null, which is never indexed.
    pub fn coerce(value: &FieldValue, column_type: ColumnType) -> Result<Option<IndexKey>> {
        if value.is_null() {
            return Ok(None);
        }

        let key = match column_type {
            ColumnType::Text | ColumnType::FullText | ColumnType::Enum => IndexKey::Text(value.to_string()),
            ColumnType::Guid => match value {
                FieldValue::Guid(g) => IndexKey::Guid(*g),
                other => IndexKey::Guid(Uuid::parse_str(other.to_string().trim())?),
            },
            ColumnType::Integer => match value {
                FieldValue::Integer(i) => IndexKey::Integer(*i),
                FieldValue::Float(f) if f.fract() == 0.0 => IndexKey::Integer(*f as i64),
                FieldValue::Boolean(b) => IndexKey::Integer(*b as i64),
                FieldValue::Text(s) => IndexKey::Integer(s.trim().parse().map_err(|_| mismatch(value, column_type))?),
                _ => return Err(mismatch(value, column_type)),
            },
            ColumnType::Float => match value {
                FieldValue::Float(f) => IndexKey::Float(*f),
                FieldValue::Integer(i) => IndexKey::Float(*i as f64),
                FieldValue::Text(s) => IndexKey::Float(s.trim().parse().map_err(|_| mismatch(value, column_type))?),
                _ => return Err(mismatch(value, column_type)),
            },
            ColumnType::Boolean => match value {
                FieldValue::Boolean(b) => IndexKey::Boolean(*b),
                FieldValue::Integer(i) => IndexKey::Boolean(*i != 0),
                FieldValue::Text(s) if s.eq_ignore_ascii_case("true") => IndexKey::Boolean(true),
                FieldValue::Text(s) if s.eq_ignore_ascii_case("false") => IndexKey::Boolean(false),
                _ => return Err(mismatch(value, column_type)),
            },
            ColumnType::Date => match value {
                FieldValue::Date(d) => IndexKey::Date(*d),
                FieldValue::Text(s) => IndexKey::Date(parse_date(s).ok_or_else(|| mismatch(value, column_type))?),
                _ => return Err(mismatch(value, column_type)),
            },
        };
        Ok(Some(key))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            IndexKey::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Shorten text keys to at most `max_bytes`, on a char boundary.
    pub fn truncated(self, max_bytes: usize) -> IndexKey {
        match self {
            IndexKey::Text(mut s) if s.len() > max_bytes => {
                let mut end = max_bytes;
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                s.truncate(end);
                IndexKey::Text(s)
            }
            other => other,
        }
    }

    pub fn approx_bytes(&self) -> usize {
        match self {
            IndexKey::Text(s) => std::mem::size_of::<Self>() + s.len(),
            _ => std::mem::size_of::<Self>(),
        }
    }

    pub fn to_field_value(&self) -> FieldValue {
        match self {
            IndexKey::Boolean(b) => FieldValue::Boolean(*b),
            IndexKey::Integer(i) => FieldValue::Integer(*i),
            IndexKey::Float(f) => FieldValue::Float(*f),
            IndexKey::Date(d) => FieldValue::Date(*d),
            IndexKey::Guid(g) => FieldValue::Guid(*g),
            IndexKey::Text(s) => FieldValue::Text(s.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IndexKey::Boolean(_) => 0,
            IndexKey::Integer(_) | IndexKey::Float(_) => 1,
            IndexKey::Date(_) => 2,
            IndexKey::Guid(_) => 3,
            IndexKey::Text(_) => 4,
        }
    }
}

fn mismatch(value: &FieldValue, column_type: ColumnType) -> Error {
    Error::invalid_input(format!("Cannot use '{}' as {:?}", value, column_type))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Boolean(a), IndexKey::Boolean(b)) => a.cmp(b),
            (IndexKey::Integer(a), IndexKey::Integer(b)) => a.cmp(b),
            (IndexKey::Float(a), IndexKey::Float(b)) => a.total_cmp(b),
            (IndexKey::Integer(a), IndexKey::Float(b)) => (*a as f64).total_cmp(b),
            (IndexKey::Float(a), IndexKey::Integer(b)) => a.total_cmp(&(*b as f64)),
            (IndexKey::Date(a), IndexKey::Date(b)) => a.cmp(b),
            (IndexKey::Guid(a), IndexKey::Guid(b)) => a.cmp(b),
            (IndexKey::Text(a), IndexKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_not_a_key() {
        assert!(IndexKey::coerce(&FieldValue::Null, ColumnType::Integer).unwrap().is_none());
    }

    #[test]
    fn coerces_filter_literals() {
        let guid = Uuid::new_v4();
        let key = IndexKey::coerce(&FieldValue::Text(guid.to_string()), ColumnType::Guid).unwrap();
        assert_eq!(key, Some(IndexKey::Guid(guid)));

        let key = IndexKey::coerce(&FieldValue::Text("42".into()), ColumnType::Integer).unwrap();
        assert_eq!(key, Some(IndexKey::Integer(42)));

        let key = IndexKey::coerce(&FieldValue::Text("2020-03-01".into()), ColumnType::Date).unwrap().unwrap();
        assert!(matches!(key, IndexKey::Date(_)));

        assert!(IndexKey::coerce(&FieldValue::Text("abc".into()), ColumnType::Float).is_err());
    }

    #[test]
    fn numeric_keys_compare_across_variants() {
        assert!(IndexKey::Integer(2) < IndexKey::Float(2.5));
        assert_eq!(IndexKey::Float(3.0), IndexKey::Integer(3));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let key = IndexKey::Text("héllo".into()).truncated(2);
        assert_eq!(key, IndexKey::Text("h".into()));
    }
}
