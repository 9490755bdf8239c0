pub mod core;
pub mod storage;
pub mod analysis;
pub mod bitmap;
pub mod index;
pub mod query;
pub mod view;
pub mod compression;
pub mod wire;
pub mod net;

pub use crate::core::config::{Config, NetworkConfig};
pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::types::{DocId, Document, FieldValue};
pub use crate::view::{Mapper, MapperApi, QueryResult, View, ViewRow, ViewSchema};

/*
┌──────────────────────────────── VIEWDB LAYOUT ────────────────────────────────┐
│                                                                               │
│  net::DbServer ──► wire::Packet ──► core::Database                            │
│                                         │                                     │
│          ┌──────────────────────────────┼───────────────────────┐             │
│          ▼                              ▼                       ▼             │
│  storage::DocStore            view::ViewManager        index::FullTextIndex   │
│  (docs / files, versioned)            │                                       │
│                                       ▼                                       │
│                               view::ViewHandler                               │
│            ┌──────────────┬───────────┴────────┬──────────────────┐           │
│            ▼              ▼                    ▼                  ▼           │
│    storage::RecordLog  index::OrderedIndex  index::BoolIndex  query::Filter   │
│    (view rows)         index::EnumIndex     (deleted rows)    Cache           │
│                              │                                                │
│                              ▼                                                │
│                      bitmap::WahBitmap                                        │
│                                                                               │
└───────────────────────────────────────────────────────────────────────────────┘
*/
