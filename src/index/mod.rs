//! Column indexes. Each maps a column key to the bitmap of rows holding it.

pub mod key;
pub mod store;
pub mod ordered;
pub mod boolean;
pub mod enum_index;
pub mod fulltext;

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::bitmap::WahBitmap;
use crate::core::error::Result;
use crate::view::schema::{Column, ColumnType};

pub use boolean::BoolIndex;
pub use enum_index::EnumIndex;
pub use fulltext::FullTextIndex;
pub use key::IndexKey;
pub use ordered::OrderedIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

/// Contract shared by every index variant.
pub trait RowIndex: Send + Sync {
    fn set(&self, key: &IndexKey, row: u32) -> Result<()>;

    /// Rows whose key compares true against `key`. `max_size` bounds any
    /// complement the variant has to take.
    fn query(&self, op: CompareOp, key: &IndexKey, max_size: u32) -> Result<WahBitmap>;

    /// Distinct keys, ascending.
    fn keys(&self) -> Result<Vec<IndexKey>>;

    fn save(&self) -> Result<()>;

    fn free_memory(&self) -> Result<()>;

    fn approx_bytes(&self) -> usize;
}

pub enum ColumnIndex {
    Ordered(OrderedIndex),
    Boolean(BoolIndex),
    Enum(EnumIndex),
    FullText(FullTextIndex),
}

impl ColumnIndex {
    pub fn for_column(dir: &Path, column: &Column, key_size: usize, switchover: usize) -> Self {
        let name = column.name.to_lowercase();
        match column.column_type {
            ColumnType::Boolean => ColumnIndex::Boolean(BoolIndex::new(dir.join(format!("{}.idx", name)), switchover)),
            ColumnType::Enum => ColumnIndex::Enum(EnumIndex::new(dir.join(format!("{}.mgidx", name)), switchover)),
            ColumnType::FullText => ColumnIndex::FullText(FullTextIndex::new(dir.join(format!("{}.ftidx", name)), switchover)),
            ColumnType::Guid => ColumnIndex::Ordered(OrderedIndex::new(dir.join(format!("{}.mgidx", name)), 16, switchover)),
            _ => ColumnIndex::Ordered(OrderedIndex::new(dir.join(format!("{}.mgidx", name)), key_size, switchover)),
        }
    }

    fn inner(&self) -> &dyn RowIndex {
        match self {
            ColumnIndex::Ordered(index) => index,
            ColumnIndex::Boolean(index) => index,
            ColumnIndex::Enum(index) => index,
            ColumnIndex::FullText(index) => index,
        }
    }
}

impl RowIndex for ColumnIndex {
    fn set(&self, key: &IndexKey, row: u32) -> Result<()> {
        self.inner().set(key, row)
    }

    fn query(&self, op: CompareOp, key: &IndexKey, max_size: u32) -> Result<WahBitmap> {
        self.inner().query(op, key, max_size)
    }

    fn keys(&self) -> Result<Vec<IndexKey>> {
        self.inner().keys()
    }

    fn save(&self) -> Result<()> {
        self.inner().save()
    }

    fn free_memory(&self) -> Result<()> {
        self.inner().free_memory()
    }

    fn approx_bytes(&self) -> usize {
        self.inner().approx_bytes()
    }
}

pub(crate) fn union_all<'a>(bitmaps: impl Iterator<Item = &'a WahBitmap>) -> WahBitmap {
    bitmaps.fold(WahBitmap::new(), |acc, bits| acc.or(bits))
}
