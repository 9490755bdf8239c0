use std::ops::Bound::{Excluded, Included, Unbounded};
use std::path::PathBuf;
use crate::bitmap::WahBitmap;
use crate::core::error::Result;
use crate::index::key::IndexKey;
use crate::index::store::BitmapStore;
use crate::index::{union_all, CompareOp, RowIndex};

/// Sorted key → row-set index for comparable scalar columns.
pub struct OrderedIndex {
    store: BitmapStore<IndexKey>,
    key_size: usize,
}

impl OrderedIndex {
    pub fn new(path: PathBuf, key_size: usize, switchover: usize) -> Self {
        OrderedIndex {
            store: BitmapStore::new(path, switchover),
            key_size,
        }
    }

    fn normalize(&self, key: &IndexKey) -> IndexKey {
        key.clone().truncated(self.key_size)
    }
}

impl RowIndex for OrderedIndex {
    fn set(&self, key: &IndexKey, row: u32) -> Result<()> {
        let key = self.normalize(key);
        let switchover = self.store.switchover();
        self.store.write(|entries| {
            entries.entry(key)
                .or_insert_with(|| WahBitmap::with_switchover(switchover))
                .set(row, true);
        })
    }

    fn query(&self, op: CompareOp, key: &IndexKey, _max_size: u32) -> Result<WahBitmap> {
        let key = self.normalize(key);
        self.store.read(|entries| match op {
            CompareOp::Equal => entries.get(&key).cloned().unwrap_or_default(),
            CompareOp::NotEqual => union_all(entries.iter().filter(|(k, _)| **k != key).map(|(_, b)| b)),
            CompareOp::Greater => union_all(entries.range((Excluded(&key), Unbounded)).map(|(_, b)| b)),
            CompareOp::GreaterOrEqual => union_all(entries.range((Included(&key), Unbounded)).map(|(_, b)| b)),
            CompareOp::Less => union_all(entries.range((Unbounded, Excluded(&key))).map(|(_, b)| b)),
            CompareOp::LessOrEqual => union_all(entries.range((Unbounded, Included(&key))).map(|(_, b)| b)),
        })
    }

    fn keys(&self) -> Result<Vec<IndexKey>> {
        self.store.read(|entries| entries.keys().cloned().collect())
    }

    fn save(&self) -> Result<()> {
        self.store.save()
    }

    fn free_memory(&self) -> Result<()> {
        self.store.free_memory()
    }

    fn approx_bytes(&self) -> usize {
        self.store.approx_bytes(IndexKey::approx_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(bitmap: &WahBitmap) -> Vec<u32> {
        bitmap.bit_indexes().collect()
    }

    #[test]
    fn range_queries() {
        let dir = tempfile::tempdir().unwrap();
        let index = OrderedIndex::new(dir.path().join("serial.mgidx"), 60, 10);
        for row in 0..20u32 {
            index.set(&IndexKey::Integer((row % 5) as i64), row).unwrap();
        }

        let key = IndexKey::Integer(3);
        assert_eq!(rows(&index.query(CompareOp::Equal, &key, 20).unwrap()), vec![3, 8, 13, 18]);
        assert_eq!(index.query(CompareOp::Greater, &key, 20).unwrap().count_ones(), 4);
        assert_eq!(index.query(CompareOp::GreaterOrEqual, &key, 20).unwrap().count_ones(), 8);
        assert_eq!(index.query(CompareOp::Less, &key, 20).unwrap().count_ones(), 12);
        assert_eq!(index.query(CompareOp::LessOrEqual, &key, 20).unwrap().count_ones(), 16);
        assert_eq!(index.query(CompareOp::NotEqual, &key, 20).unwrap().count_ones(), 16);
        assert!(index.query(CompareOp::Equal, &IndexKey::Integer(9), 20).unwrap().is_empty());
    }

    #[test]
    fn keys_are_sorted_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("name.mgidx");
        {
            let index = OrderedIndex::new(path.clone(), 60, 10);
            for (row, name) in ["pear", "apple", "fig", "apple"].iter().enumerate() {
                index.set(&IndexKey::Text(name.to_string()), row as u32).unwrap();
            }
            index.save().unwrap();
        }

        let index = OrderedIndex::new(path, 60, 10);
        let keys = index.keys().unwrap();
        assert_eq!(keys, vec![
            IndexKey::Text("apple".into()),
            IndexKey::Text("fig".into()),
            IndexKey::Text("pear".into()),
        ]);
        let apples = index.query(CompareOp::Equal, &IndexKey::Text("apple".into()), 4).unwrap();
        assert_eq!(rows(&apples), vec![1, 3]);
    }

    #[test]
    fn long_text_keys_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let index = OrderedIndex::new(dir.path().join("t.mgidx"), 4, 10);
        index.set(&IndexKey::Text("abcdefgh".into()), 0).unwrap();
        let hit = index.query(CompareOp::Equal, &IndexKey::Text("abcdzzzz".into()), 1).unwrap();
        assert_eq!(hit.count_ones(), 1);
    }
}
