use std::fs;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::compression::compress::{CompressedBlock, CompressionType};
use crate::core::error::Result;
use crate::storage::doc_store::{DocStore, StorageItem};
use crate::storage::layout::StorageLayout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreKind {
    Documents,
    Files,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub store: StoreKind,
    pub item: StorageItem,
}

/// Records how far each store has been backed up.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct BackupMark {
    sequence: u64,
    documents: u32,
    files: u32,
}

/// Incremental backups into `backup/`, replay from `restore/`.
pub struct BackupManager {
    layout: StorageLayout,
}

impl BackupManager {
    pub fn new(layout: StorageLayout) -> Self {
        BackupManager { layout }
    }

    /// Write every record added since the previous backup. Returns false when
    /// nothing changed.
    pub fn backup(&self, documents: &DocStore, files: &DocStore) -> Result<bool> {
        let mark = self.read_mark()?;
        let mut entries = Vec::new();

        for record in mark.documents..documents.record_count() {
            entries.push(BackupEntry { store: StoreKind::Documents, item: documents.read(record)? });
        }
        for record in mark.files..files.record_count() {
            entries.push(BackupEntry { store: StoreKind::Files, item: files.read(record)? });
        }

        if entries.is_empty() {
            return Ok(false);
        }

        let payload = bincode::serialize(&entries)?;
        let block = CompressedBlock::compress(&payload, CompressionType::Zstd)?;
        let next = BackupMark {
            sequence: mark.sequence + 1,
            documents: documents.record_count(),
            files: files.record_count(),
        };

        let path = self.layout.backup_path(next.sequence);
        fs::write(&path, bincode::serialize(&block)?)?;
        fs::write(self.layout.backup_mark_path(), bincode::serialize(&next)?)?;

        info!("Backup {} written with {} records", path.display(), entries.len());
        Ok(true)
    }

    /// Archives waiting in `restore/`, oldest name first.
    pub fn pending_restores(&self) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.layout.restore_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "mgbak").unwrap_or(false))
            .collect();
        paths.sort();
        Ok(paths)
    }

    pub fn read_archive(&self, path: &PathBuf) -> Result<Vec<BackupEntry>> {
        let block: CompressedBlock = bincode::deserialize(&fs::read(path)?)?;
        Ok(bincode::deserialize(&block.decompress()?)?)
    }

    /// Move a replayed archive into `restore/done/`.
    pub fn finish_restore(&self, path: &PathBuf) -> Result<()> {
        if let Some(name) = path.file_name() {
            fs::rename(path, self.layout.restore_done_dir().join(name))?;
        }
        Ok(())
    }

    fn read_mark(&self) -> Result<BackupMark> {
        let path = self.layout.backup_mark_path();
        if !path.exists() {
            return Ok(BackupMark::default());
        }
        Ok(bincode::deserialize(&fs::read(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DocId;

    #[test]
    fn backups_are_incremental() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let docs = DocStore::open(&layout.docs_path()).unwrap();
        let files = DocStore::open(&layout.files_path()).unwrap();
        let manager = BackupManager::new(layout.clone());

        docs.set(DocId::new(), "Invoice", b"a".to_vec()).unwrap();
        files.set(DocId::new(), "", b"blob".to_vec()).unwrap();
        assert!(manager.backup(&docs, &files).unwrap());
        assert!(!manager.backup(&docs, &files).unwrap());

        docs.set(DocId::new(), "Invoice", b"b".to_vec()).unwrap();
        assert!(manager.backup(&docs, &files).unwrap());

        let second = layout.backup_path(2);
        let restore_path = layout.restore_dir.join("00000002.mgbak");
        fs::copy(&second, &restore_path).unwrap();

        let pending = manager.pending_restores().unwrap();
        assert_eq!(pending, vec![restore_path.clone()]);
        let entries = manager.read_archive(&restore_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].item.data, b"b");

        manager.finish_restore(&restore_path).unwrap();
        assert!(manager.pending_restores().unwrap().is_empty());
        assert!(layout.restore_done_dir().join("00000002.mgbak").exists());
    }
}
