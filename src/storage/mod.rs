pub mod layout;
pub mod record_log;
pub mod doc_store;
pub mod backup;

pub use doc_store::{DocStore, StorageItem};
pub use layout::StorageLayout;
pub use record_log::RecordLog;
