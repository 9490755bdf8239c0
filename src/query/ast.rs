use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::core::types::FieldValue;
use crate::index::CompareOp;

/// Parsed filter expression over view columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Compare {
        column: String,
        op: CompareOp,
        value: FieldValue,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(column: &str, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Filter::Compare {
            column: column.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Every column the filter touches, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Compare { column, .. } => out.push(column),
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Filter::Not(inner) => inner.collect_columns(out),
        }
    }

    /// Fold the tree, resolving each comparison with `leaf`.
    pub fn evaluate<T>(
        &self,
        leaf: &mut impl FnMut(&str, CompareOp, &FieldValue) -> Result<T>,
        combine: &impl Fn(Combine<T>) -> T,
    ) -> Result<T> {
        Ok(match self {
            Filter::Compare { column, op, value } => leaf(column, *op, value)?,
            Filter::And(a, b) => {
                let left = a.evaluate(leaf, combine)?;
                let right = b.evaluate(leaf, combine)?;
                combine(Combine::And(left, right))
            }
            Filter::Or(a, b) => {
                let left = a.evaluate(leaf, combine)?;
                let right = b.evaluate(leaf, combine)?;
                combine(Combine::Or(left, right))
            }
            Filter::Not(inner) => {
                let value = inner.evaluate(leaf, combine)?;
                combine(Combine::Not(value))
            }
        })
    }
}

pub enum Combine<T> {
    And(T, T),
    Or(T, T),
    Not(T),
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Greater => ">",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::Less => "<",
            CompareOp::LessOrEqual => "<=",
        };
        write!(f, "{}", symbol)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Filter::Compare { column, op, value } => match value {
                FieldValue::Text(s) => write!(f, "{} {} \"{}\"", column, op, s),
                FieldValue::Null => write!(f, "{} {} null", column, op),
                other => write!(f, "{} {} {}", column, op, other),
            },
            Filter::And(a, b) => write!(f, "({} and {})", a, b),
            Filter::Or(a, b) => write!(f, "({} or {})", a, b),
            Filter::Not(inner) => write!(f, "not {}", inner),
        }
    }
}
