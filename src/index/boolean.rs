use std::fs;
use std::path::PathBuf;
use parking_lot::Mutex;
use crate::bitmap::WahBitmap;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::key::IndexKey;
use crate::index::{CompareOp, RowIndex};

/// Two-valued index holding only the set of true rows. Every access goes
/// through the instance lock, so `free_memory` may race with queries.
pub struct BoolIndex {
    path: PathBuf,
    switchover: usize,
    state: Mutex<BoolState>,
}

struct BoolState {
    bits: Option<WahBitmap>,
    dirty: bool,
}

impl BoolIndex {
    pub fn new(path: PathBuf, switchover: usize) -> Self {
        BoolIndex {
            path,
            switchover,
            state: Mutex::new(BoolState { bits: None, dirty: false }),
        }
    }

    /// Copy of the true-set.
    pub fn bits(&self) -> Result<WahBitmap> {
        let mut state = self.state.lock();
        Ok(self.loaded(&mut state)?.clone())
    }

    pub fn set_bit(&self, row: u32, value: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.loaded(&mut state)?.set(row, value);
        state.dirty = true;
        Ok(())
    }

    /// `bits |= other`
    pub fn in_place_or(&self, other: &WahBitmap) -> Result<()> {
        let mut state = self.state.lock();
        let merged = self.loaded(&mut state)?.or(other);
        state.bits = Some(merged);
        state.dirty = true;
        Ok(())
    }

    fn loaded<'a>(&self, state: &'a mut BoolState) -> Result<&'a mut WahBitmap> {
        if state.bits.is_none() {
            state.bits = Some(self.read_file()?);
        }
        match state.bits.as_mut() {
            Some(bits) => Ok(bits),
            None => Err(Error::new(ErrorKind::Internal, format!("{} not loaded", self.path.display()))),
        }
    }

    fn read_file(&self) -> Result<WahBitmap> {
        if !self.path.exists() {
            return Ok(WahBitmap::with_switchover(self.switchover));
        }
        WahBitmap::from_file_bytes(&fs::read(&self.path)?, self.switchover)
    }

    fn write_file(&self, state: &mut BoolState) -> Result<()> {
        if !state.dirty {
            return Ok(());
        }
        if let Some(bits) = &state.bits {
            let tmp = self.path.with_extension("tmp");
            fs::write(&tmp, bits.to_file_bytes())?;
            fs::rename(&tmp, &self.path)?;
        }
        state.dirty = false;
        Ok(())
    }
}

impl RowIndex for BoolIndex {
    fn set(&self, key: &IndexKey, row: u32) -> Result<()> {
        match key.as_bool() {
            Some(value) => self.set_bit(row, value),
            None => Err(Error::invalid_input(format!("Boolean index cannot hold {:?}", key))),
        }
    }

    fn query(&self, op: CompareOp, key: &IndexKey, max_size: u32) -> Result<WahBitmap> {
        let value = key.as_bool()
            .ok_or_else(|| Error::query_compile(format!("Expected true or false, got {:?}", key)))?;
        let wanted = match op {
            CompareOp::Equal => value,
            CompareOp::NotEqual => !value,
            other => return Err(Error::query_compile(format!("{:?} is not valid on a boolean column", other))),
        };

        let bits = self.bits()?;
        Ok(if wanted { bits } else { bits.not(max_size) })
    }

    fn keys(&self) -> Result<Vec<IndexKey>> {
        Ok(vec![IndexKey::Boolean(false), IndexKey::Boolean(true)])
    }

    fn save(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.write_file(&mut state)
    }

    fn free_memory(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.write_file(&mut state)?;
        state.bits = None;
        Ok(())
    }

    fn approx_bytes(&self) -> usize {
        self.state.lock().bits.as_ref().map(|b| b.approx_bytes()).unwrap_or(0)
    }
}
