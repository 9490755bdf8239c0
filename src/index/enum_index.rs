use std::path::PathBuf;
use crate::bitmap::WahBitmap;
use crate::core::error::Result;
use crate::index::key::IndexKey;
use crate::index::ordered::OrderedIndex;
use crate::index::{CompareOp, RowIndex};

pub const ENUM_KEY_SIZE: usize = 30;

/// Ordered index over the string rendering of enum values.
pub struct EnumIndex {
    inner: OrderedIndex,
}

impl EnumIndex {
    pub fn new(path: PathBuf, switchover: usize) -> Self {
        EnumIndex {
            inner: OrderedIndex::new(path, ENUM_KEY_SIZE, switchover),
        }
    }

    fn render(key: &IndexKey) -> IndexKey {
        match key {
            IndexKey::Text(_) => key.clone(),
            other => IndexKey::Text(other.to_field_value().to_string()),
        }
    }
}

impl RowIndex for EnumIndex {
    fn set(&self, key: &IndexKey, row: u32) -> Result<()> {
        self.inner.set(&Self::render(key), row)
    }

    fn query(&self, op: CompareOp, key: &IndexKey, max_size: u32) -> Result<WahBitmap> {
        self.inner.query(op, &Self::render(key), max_size)
    }

    fn keys(&self) -> Result<Vec<IndexKey>> {
        self.inner.keys()
    }

    fn save(&self) -> Result<()> {
        self.inner.save()
    }

    fn free_memory(&self) -> Result<()> {
        self.inner.free_memory()
    }

    fn approx_bytes(&self) -> usize {
        self.inner.approx_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_text_keys_use_their_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let index = EnumIndex::new(dir.path().join("status.mgidx"), 10);
        index.set(&IndexKey::Text("Approved".into()), 0).unwrap();
        index.set(&IndexKey::Integer(2), 1).unwrap();

        let hit = index.query(CompareOp::Equal, &IndexKey::Text("2".into()), 2).unwrap();
        assert_eq!(hit.bit_indexes().collect::<Vec<_>>(), vec![1]);
        assert_eq!(index.keys().unwrap().len(), 2);
    }
}
