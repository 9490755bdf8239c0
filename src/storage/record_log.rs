use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use tracing::warn;
use crate::core::error::{Error, ErrorKind, Result};

const RECORD_HEADER: u64 = 8;
const MAX_RECORD: usize = 256 * 1024 * 1024;

/// Append-only file of `[u32 len][u32 crc32][payload]` records, addressed by
/// record number (0-based, insertion order).
pub struct RecordLog {
    path: PathBuf,
    inner: Mutex<LogInner>,
}

struct LogInner {
    file: File,
    offsets: Vec<u64>,
    end: u64,
}

impl RecordLog {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let (offsets, end) = scan(&mut file, path)?;
        let file_len = file.metadata()?.len();
        if end < file_len {
            warn!("Truncating torn tail of {} ({} bytes)", path.display(), file_len - end);
            file.set_len(end)?;
        }

        Ok(RecordLog {
            path: path.to_path_buf(),
            inner: Mutex::new(LogInner { file, offsets, end }),
        })
    }

    /// Returns the record number of the new record.
    pub fn append(&self, payload: &[u8]) -> Result<u32> {
        if payload.len() > MAX_RECORD {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Record of {} bytes exceeds limit", payload.len()),
            ));
        }

        let mut inner = self.inner.lock();
        let offset = inner.end;

        let mut buf = Vec::with_capacity(RECORD_HEADER as usize + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        buf.extend_from_slice(payload);

        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(&buf)?;

        inner.end += buf.len() as u64;
        inner.offsets.push(offset);
        Ok((inner.offsets.len() - 1) as u32)
    }

    pub fn read(&self, record: u32) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        let offset = *inner.offsets.get(record as usize).ok_or_else(|| {
            Error::not_found(format!("Record {} not in {}", record, self.path.display()))
        })?;

        inner.file.seek(SeekFrom::Start(offset))?;
        let (len, crc) = read_header(&mut inner.file)?;
        let mut payload = vec![0u8; len];
        inner.file.read_exact(&mut payload)?;

        if crc32fast::hash(&payload) != crc {
            return Err(Error::corruption(format!(
                "Checksum mismatch for record {} in {}", record, self.path.display()
            )));
        }
        Ok(payload)
    }

    pub fn count(&self) -> u32 {
        self.inner.lock().offsets.len() as u32
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

fn read_header(file: &mut File) -> Result<(usize, u32)> {
    let mut header = [0u8; RECORD_HEADER as usize];
    file.read_exact(&mut header)?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Ok((len, crc))
}

/// Builds the offset table. A record that runs past the end of the file, or
/// whose checksum fails on the last record, is a torn write and ends the scan.
fn scan(file: &mut File, path: &Path) -> Result<(Vec<u64>, u64)> {
    let file_len = file.metadata()?.len();
    let mut offsets = Vec::new();
    let mut pos = 0u64;
    file.seek(SeekFrom::Start(0))?;

    while pos + RECORD_HEADER <= file_len {
        let (len, crc) = read_header(file)?;
        let next = pos + RECORD_HEADER + len as u64;
        if len > MAX_RECORD || next > file_len {
            break;
        }

        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload)?;
        if crc32fast::hash(&payload) != crc {
            if next == file_len {
                break;
            }
            return Err(Error::corruption(format!(
                "Checksum mismatch at offset {} in {}", pos, path.display()
            )));
        }

        offsets.push(pos);
        pos = next;
    }

    Ok((offsets, pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let log = RecordLog::open(&path).unwrap();
        assert_eq!(log.append(b"first").unwrap(), 0);
        assert_eq!(log.append(b"second").unwrap(), 1);
        drop(log);

        let log = RecordLog::open(&path).unwrap();
        assert_eq!(log.count(), 2);
        assert_eq!(log.read(1).unwrap(), b"second");
        assert_eq!(log.append(b"third").unwrap(), 2);
        assert_eq!(log.read(0).unwrap(), b"first");
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let log = RecordLog::open(&path).unwrap();
        log.append(b"complete").unwrap();
        drop(log);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&100u32.to_le_bytes()).unwrap();
        file.write_all(b"partial").unwrap();
        drop(file);

        let log = RecordLog::open(&path).unwrap();
        assert_eq!(log.count(), 1);
        assert_eq!(log.append(b"next").unwrap(), 1);
        assert_eq!(log.read(1).unwrap(), b"next");
    }

    #[test]
    fn damaged_middle_record_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let log = RecordLog::open(&path).unwrap();
        log.append(b"aaaa").unwrap();
        log.append(b"bbbb").unwrap();
        drop(log);

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[RECORD_HEADER as usize] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let err = RecordLog::open(&path).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Corruption);
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecordLog::open(&dir.path().join("rows.dat")).unwrap();
        assert_eq!(log.read(3).unwrap_err().kind, ErrorKind::NotFound);
    }
}
