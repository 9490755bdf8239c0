use std::path::PathBuf;
use std::fs;
use crate::core::error::Result;

/// Directory structure for data files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory
    pub data_dir: PathBuf,      // Document and file record logs
    pub views_dir: PathBuf,     // One sub-directory per view
    pub backup_dir: PathBuf,    // Outgoing backup archives
    pub restore_dir: PathBuf,   // Archives waiting to be replayed
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let data_dir = base_dir.join("data");
        let views_dir = base_dir.join("views");
        let backup_dir = base_dir.join("backup");
        let restore_dir = base_dir.join("restore");

        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&views_dir)?;
        fs::create_dir_all(&backup_dir)?;
        fs::create_dir_all(restore_dir.join("done"))?;

        Ok(StorageLayout {
            base_dir,
            data_dir,
            views_dir,
            backup_dir,
            restore_dir,
        })
    }

    pub fn docs_path(&self) -> PathBuf {
        self.data_dir.join("data.mgdat")
    }

    pub fn files_path(&self) -> PathBuf {
        self.data_dir.join("files.mgdat")
    }

    pub fn fulltext_path(&self) -> PathBuf {
        self.data_dir.join("fulltext.idx")
    }

    pub fn view_dir(&self, view_name: &str) -> PathBuf {
        self.views_dir.join(view_name.to_lowercase())
    }

    pub fn backup_mark_path(&self) -> PathBuf {
        self.backup_dir.join("lastbackup.dat")
    }

    pub fn backup_path(&self, sequence: u64) -> PathBuf {
        self.backup_dir.join(format!("{:08}.mgbak", sequence))
    }

    pub fn restore_done_dir(&self) -> PathBuf {
        self.restore_dir.join("done")
    }
}
