use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use crate::core::types::{DocId, Document};
use crate::core::error::{Result, Error, ErrorKind};

/// Handle returned by `begin`; the caller passes it back to stage, query,
/// commit or roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Documents staged by one transaction, in save order.
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub id: TransactionId,
    pub started: DateTime<Utc>,
    pub documents: Vec<(DocId, Document)>,
}

/// Tracks open transactions. A transaction is visible only through its id.
pub struct TransactionManager {
    next_id: AtomicU64,
    active: Mutex<HashMap<TransactionId, PendingTransaction>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager {
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self) -> TransactionId {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.active.lock().insert(id, PendingTransaction {
            id,
            started: Utc::now(),
            documents: Vec::new(),
        });
        id
    }

    pub fn is_active(&self, id: TransactionId) -> bool {
        self.active.lock().contains_key(&id)
    }

    pub fn check_active(&self, id: TransactionId) -> Result<()> {
        if self.is_active(id) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::InvalidState, format!("Transaction {} is not active", id)))
        }
    }

    pub fn stage(&self, id: TransactionId, docid: DocId, doc: Document) -> Result<()> {
        let mut active = self.active.lock();
        let pending = active.get_mut(&id)
            .ok_or_else(|| Error::new(ErrorKind::InvalidState, format!("Transaction {} is not active", id)))?;
        pending.documents.push((docid, doc));
        Ok(())
    }

    /// Remove and return the transaction for commit.
    pub fn take(&self, id: TransactionId) -> Result<PendingTransaction> {
        self.active.lock().remove(&id)
            .ok_or_else(|| Error::new(ErrorKind::InvalidState, format!("Transaction {} is not active", id)))
    }

    pub fn discard(&self, id: TransactionId) -> bool {
        self.active.lock().remove(&id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
