//! Views: typed projections of documents with one index per column.

pub mod schema;
pub mod definition;
pub mod row;
pub mod handler;
pub mod manager;

pub use definition::{Mapper, MapperApi, RowBatch, View};
pub use handler::{ViewHandler, ViewState};
pub use manager::{FailedView, ViewManager};
pub use row::{FromRow, QueryResult, RowFiller, ViewRow};
pub use schema::{Column, ColumnType, ViewSchema, DOCID_COLUMN};
