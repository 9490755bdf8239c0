use std::collections::BTreeMap;
use std::path::PathBuf;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use crate::bitmap::WahBitmap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::wire::framing::FrameCodec;

/// Key → bitmap map persisted as one framed file. Loaded on first use and
/// dropped again by [`free_memory`](Self::free_memory).
pub struct BitmapStore<K> {
    path: PathBuf,
    switchover: usize,
    codec: FrameCodec,
    state: RwLock<StoreState<K>>,
}

struct StoreState<K> {
    entries: Option<BTreeMap<K, WahBitmap>>,
    dirty: bool,
}

impl<K> BitmapStore<K>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
{
    pub fn new(path: PathBuf, switchover: usize) -> Self {
        BitmapStore {
            path,
            switchover,
            codec: FrameCodec::compressing(),
            state: RwLock::new(StoreState { entries: None, dirty: false }),
        }
    }

    pub fn switchover(&self) -> usize {
        self.switchover
    }

    pub fn read<R>(&self, f: impl FnOnce(&BTreeMap<K, WahBitmap>) -> R) -> Result<R> {
        {
            let state = self.state.read();
            if let Some(entries) = &state.entries {
                return Ok(f(entries));
            }
        }

        let mut state = self.state.write();
        self.ensure_loaded(&mut state)?;
        let state = RwLockWriteGuard::downgrade(state);
        match &state.entries {
            Some(entries) => Ok(f(entries)),
            None => Err(Error::new(ErrorKind::Internal, format!("{} not loaded", self.path.display()))),
        }
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut BTreeMap<K, WahBitmap>) -> R) -> Result<R> {
        let mut state = self.state.write();
        self.ensure_loaded(&mut state)?;
        state.dirty = true;
        match &mut state.entries {
            Some(entries) => Ok(f(entries)),
            None => Err(Error::new(ErrorKind::Internal, format!("{} not loaded", self.path.display()))),
        }
    }

    /// Flush to disk if anything changed since the last save.
    pub fn save(&self) -> Result<()> {
        let mut state = self.state.write();
        self.save_locked(&mut state)
    }

    pub fn free_memory(&self) -> Result<()> {
        let mut state = self.state.write();
        self.save_locked(&mut state)?;
        state.entries = None;
        Ok(())
    }

    pub fn approx_bytes(&self, key_bytes: impl Fn(&K) -> usize) -> usize {
        let state = self.state.read();
        match &state.entries {
            Some(entries) => entries.iter().map(|(k, b)| key_bytes(k) + b.approx_bytes()).sum(),
            None => 0,
        }
    }

    fn ensure_loaded(&self, state: &mut StoreState<K>) -> Result<()> {
        if state.entries.is_none() {
            state.entries = Some(self.load()?);
        }
        Ok(())
    }

    fn save_locked(&self, state: &mut StoreState<K>) -> Result<()> {
        if !state.dirty {
            return Ok(());
        }
        if let Some(entries) = &state.entries {
            let serialized: Vec<(&K, Vec<u8>)> = entries.iter()
                .map(|(k, bitmap)| (k, bitmap.to_file_bytes()))
                .collect();
            let payload = bincode::serialize(&serialized)?;
            self.codec.write_file(&self.path, &payload)?;
            debug!("Saved {} keys to {}", entries.len(), self.path.display());
        }
        state.dirty = false;
        Ok(())
    }

    fn load(&self) -> Result<BTreeMap<K, WahBitmap>> {
        let payload = match self.codec.read_file(&self.path)? {
            Some(payload) => payload,
            None => return Ok(BTreeMap::new()),
        };

        let serialized: Vec<(K, Vec<u8>)> = bincode::deserialize(&payload)
            .map_err(|e| Error::corruption(format!("{}: {}", self.path.display(), e)))?;

        let mut entries = BTreeMap::new();
        for (key, bytes) in serialized {
            entries.insert(key, WahBitmap::from_file_bytes(&bytes, self.switchover)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reloads_after_free_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store: BitmapStore<String> = BitmapStore::new(dir.path().join("terms.idx"), 10);

        store.write(|entries| {
            entries.entry("alpha".to_string()).or_default().set(3, true);
        }).unwrap();
        assert!(store.approx_bytes(|k| k.len()) > 0);

        store.free_memory().unwrap();
        assert_eq!(store.approx_bytes(|k| k.len()), 0);

        let hit = store.read(|entries| entries.get("alpha").map(|b| b.get(3))).unwrap();
        assert_eq!(hit, Some(true));
    }

    #[test]
    fn save_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.idx");
        {
            let store: BitmapStore<String> = BitmapStore::new(path.clone(), 10);
            store.write(|entries| {
                entries.entry("beta".to_string()).or_default().set(1, true);
            }).unwrap();
            store.save().unwrap();
        }
        let header = std::fs::read(&path).unwrap()[0];
        assert_ne!(header & crate::wire::framing::FLAG_COMPRESSED, 0);

        let store: BitmapStore<String> = BitmapStore::new(path, 10);
        let count = store.read(|entries| entries.len()).unwrap();
        assert_eq!(count, 1);
    }
}
