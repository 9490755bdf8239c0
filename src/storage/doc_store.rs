use std::collections::HashMap;
use std::path::Path;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::core::types::DocId;
use crate::storage::record_log::RecordLog;

/// One saved version (or tombstone) of a keyed blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageItem {
    pub key: DocId,
    pub deleted: bool,
    pub timestamp: DateTime<Utc>,
    pub doc_type: String,
    pub data: Vec<u8>,
}

/// Versioned key/value store over a [`RecordLog`]. Every save or delete is
/// a new record; the record number doubles as the version number.
pub struct DocStore {
    log: RecordLog,
    versions: RwLock<HashMap<DocId, Vec<u32>>>,
}

impl DocStore {
    pub fn open(path: &Path) -> Result<Self> {
        let log = RecordLog::open(path)?;
        let mut versions: HashMap<DocId, Vec<u32>> = HashMap::new();

        for record in 0..log.count() {
            let item: StorageItem = bincode::deserialize(&log.read(record)?)?;
            versions.entry(item.key).or_default().push(record);
        }

        Ok(DocStore {
            log,
            versions: RwLock::new(versions),
        })
    }

    pub fn set(&self, key: DocId, doc_type: &str, data: Vec<u8>) -> Result<u32> {
        self.append(StorageItem {
            key,
            deleted: false,
            timestamp: Utc::now(),
            doc_type: doc_type.to_string(),
            data,
        })
    }

    pub fn delete(&self, key: DocId) -> Result<u32> {
        self.append(StorageItem {
            key,
            deleted: true,
            timestamp: Utc::now(),
            doc_type: String::new(),
            data: Vec::new(),
        })
    }

    /// Append an item as-is, keeping its timestamp. Used by restore.
    pub fn append(&self, item: StorageItem) -> Result<u32> {
        let payload = bincode::serialize(&item)?;
        let mut versions = self.versions.write();
        let record = self.log.append(&payload)?;
        versions.entry(item.key).or_default().push(record);
        Ok(record)
    }

    /// Latest version, `None` if never saved or deleted.
    pub fn get(&self, key: &DocId) -> Result<Option<StorageItem>> {
        let last = self.versions.read().get(key).and_then(|v| v.last().copied());
        match last {
            Some(record) => {
                let item = self.read(record)?;
                Ok(if item.deleted { None } else { Some(item) })
            }
            None => Ok(None),
        }
    }

    pub fn exists(&self, key: &DocId) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Version numbers of every save of `key`, oldest first. Tombstones are skipped.
    pub fn history(&self, key: &DocId) -> Result<Vec<u32>> {
        let records = self.versions.read().get(key).cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            if !self.read(record)?.deleted {
                out.push(record);
            }
        }
        Ok(out)
    }

    pub fn get_version(&self, record: u32) -> Result<Option<StorageItem>> {
        if record >= self.log.count() {
            return Ok(None);
        }
        let item = self.read(record)?;
        Ok(if item.deleted { None } else { Some(item) })
    }

    pub fn read(&self, record: u32) -> Result<StorageItem> {
        let payload = self.log.read(record)?;
        bincode::deserialize(&payload)
            .map_err(|e| Error::corruption(format!("Record {}: {}", record, e)))
    }

    pub fn record_count(&self) -> u32 {
        self.log.count()
    }

    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_every_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocStore::open(&dir.path().join("docs.mgdat")).unwrap();
        let key = DocId::new();
        let other = DocId::new();

        let v1 = store.set(key, "Invoice", b"one".to_vec()).unwrap();
        store.set(other, "Invoice", b"other".to_vec()).unwrap();
        let v2 = store.set(key, "Invoice", b"two".to_vec()).unwrap();

        assert_eq!(store.get(&key).unwrap().unwrap().data, b"two");
        assert_eq!(store.history(&key).unwrap(), vec![v1, v2]);
        assert_eq!(store.get_version(v1).unwrap().unwrap().data, b"one");
        assert!(store.get_version(99).unwrap().is_none());
    }

    #[test]
    fn delete_hides_latest_but_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.mgdat");
        let key = DocId::new();

        {
            let store = DocStore::open(&path).unwrap();
            store.set(key, "Invoice", b"one".to_vec()).unwrap();
            let tombstone = store.delete(key).unwrap();
            assert!(store.get(&key).unwrap().is_none());
            assert!(store.get_version(tombstone).unwrap().is_none());
        }

        let store = DocStore::open(&path).unwrap();
        assert_eq!(store.record_count(), 2);
        assert!(!store.exists(&key).unwrap());
        assert_eq!(store.history(&key).unwrap(), vec![0]);
    }
}
