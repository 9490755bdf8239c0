use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::transaction::TransactionId;
use crate::core::types::{DocId, Document};
use crate::storage::layout::StorageLayout;
use crate::view::definition::View;
use crate::view::handler::ViewHandler;
use crate::view::row::QueryResult;
use crate::view::schema::ViewSchema;

struct BackgroundInsert {
    handler: Arc<ViewHandler>,
    docid: DocId,
    doc: Document,
}

/// A registered view whose stored data could not be opened.
#[derive(Debug, Clone)]
pub struct FailedView {
    pub name: String,
    pub kind: ErrorKind,
    pub reason: String,
    primary_types: Vec<String>,
}

/// Registry of open views and the routing of documents to them.
pub struct ViewManager {
    handlers: Vec<Arc<ViewHandler>>,
    by_name: HashMap<String, Arc<ViewHandler>>,
    primary: HashMap<String, Arc<ViewHandler>>,
    failed: HashMap<String, FailedView>,
    background: Mutex<Option<Sender<BackgroundInsert>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ViewManager {
    /// Open every active view. Also returns the handlers whose data has to
    /// be rebuilt from the document store. A view that fails to open is
    /// recorded in `failed()` and the others carry on.
    pub fn open(views: Vec<View>, layout: &StorageLayout, config: &Config) -> Result<(Self, Vec<Arc<ViewHandler>>)> {
        let mut handlers = Vec::new();
        let mut by_name = HashMap::new();
        let mut primary: HashMap<String, Arc<ViewHandler>> = HashMap::new();
        let mut stale = Vec::new();
        let mut failed: HashMap<String, FailedView> = HashMap::new();

        for view in views {
            if !view.is_active {
                info!("View '{}' is inactive, skipping", view.name);
                continue;
            }
            let key = view.name.to_lowercase();
            if by_name.contains_key(&key) || failed.contains_key(&key) {
                return Err(Error::invalid_input(format!("View '{}' registered twice", view.name)));
            }

            let name = view.name.clone();
            let primary_types = if view.is_primary_list {
                view.fire_on_types.iter().map(|t| t.to_lowercase()).collect()
            } else {
                Vec::new()
            };
            let (handler, needs_rebuild) = match ViewHandler::open(view, layout.view_dir(&key), config) {
                Ok(opened) => opened,
                Err(e) => {
                    error!("View '{}' failed to open: {}", name, e);
                    failed.insert(key, FailedView { name, kind: e.kind, reason: e.context, primary_types });
                    continue;
                }
            };
            let handler = Arc::new(handler);

            if handler.view().is_primary_list {
                for doc_type in &handler.view().fire_on_types {
                    let previous = primary.insert(doc_type.to_lowercase(), handler.clone());
                    if let Some(previous) = previous {
                        return Err(Error::invalid_input(format!(
                            "'{}' has two primary views: '{}' and '{}'",
                            doc_type, previous.name(), handler.name()
                        )));
                    }
                }
            }

            if needs_rebuild {
                stale.push(handler.clone());
            }
            by_name.insert(key, handler.clone());
            handlers.push(handler);
        }

        let (background, worker) = if handlers.iter().any(|h| h.view().background_indexing) {
            let (tx, rx) = unbounded::<BackgroundInsert>();
            let worker = thread::Builder::new()
                .name("view-indexer".to_string())
                .spawn(move || {
                    for job in rx {
                        if let Err(e) = job.handler.insert(job.docid, &job.doc) {
                            warn!("Background insert into '{}' failed: {}", job.handler.name(), e);
                        }
                    }
                    debug!("Background indexer stopped");
                })?;
            (Some(tx), Some(worker))
        } else {
            (None, None)
        };

        Ok((
            ViewManager {
                handlers,
                by_name,
                primary,
                failed,
                background: Mutex::new(background),
                worker: Mutex::new(worker),
            },
            stale,
        ))
    }

    pub fn handlers(&self) -> &[Arc<ViewHandler>] {
        &self.handlers
    }

    pub fn get(&self, name: &str) -> Result<&Arc<ViewHandler>> {
        let key = name.to_lowercase();
        if let Some(handler) = self.by_name.get(&key) {
            return Ok(handler);
        }
        match self.failed.get(&key) {
            Some(failed) => Err(Error::new(
                failed.kind,
                format!("View '{}' is unavailable: {}", failed.name, failed.reason),
            )),
            None => Err(Error::not_found(format!("View '{}' not found", name))),
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &FailedView> {
        self.failed.values()
    }

    /// True when `doc_type` has a primary view, including one that failed to
    /// open, so its documents are still stored.
    pub fn has_primary(&self, doc_type: &str) -> bool {
        let doc_type = doc_type.to_lowercase();
        self.primary.contains_key(&doc_type)
            || self.failed.values().any(|f| f.primary_types.contains(&doc_type))
    }

    pub fn view_name_for_type(&self, doc_type: &str) -> Option<String> {
        self.primary.get(&doc_type.to_lowercase()).map(|h| h.name().to_string())
    }

    pub fn views(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn schema(&self, name: &str) -> Result<ViewSchema> {
        Ok(self.get(name)?.schema().clone())
    }

    /// Index a document in every view firing on its type. The primary view
    /// goes first and always inline.
    pub fn insert(&self, docid: DocId, doc: &Document) -> Result<()> {
        for handler in self.firing(&doc.doc_type) {
            if handler.view().background_indexing && !handler.view().is_primary_list {
                if let Some(sender) = self.background.lock().as_ref() {
                    let job = BackgroundInsert { handler: handler.clone(), docid, doc: doc.clone() };
                    if sender.send(job).is_ok() {
                        continue;
                    }
                }
            }
            if !handler.insert(docid, doc)? {
                debug!("View '{}' skipped {}", handler.name(), docid);
            }
        }
        Ok(())
    }

    /// Stage a document in every firing view. When one view refuses it the
    /// whole transaction is discarded.
    pub fn insert_transaction(&self, tx: TransactionId, docid: DocId, doc: &Document) -> bool {
        for handler in self.firing(&doc.doc_type) {
            if !handler.insert_transaction(tx, docid, doc) {
                info!("View '{}' rolled back {}", handler.name(), tx);
                self.rollback(tx);
                return false;
            }
        }
        true
    }

    pub fn commit(&self, tx: TransactionId) -> Result<()> {
        for handler in &self.handlers {
            handler.commit(tx)?;
        }
        Ok(())
    }

    pub fn rollback(&self, tx: TransactionId) {
        for handler in &self.handlers {
            handler.rollback(tx);
        }
    }

    pub fn delete(&self, docid: DocId) -> Result<()> {
        for handler in &self.handlers {
            handler.delete(docid)?;
        }
        Ok(())
    }

    pub fn query(&self, view: &str, filter: &str, start: usize, count: i32, order_by: &str) -> Result<QueryResult> {
        self.get(view)?.query(filter, start, count, order_by)
    }

    pub fn query_in_transaction(
        &self,
        tx: TransactionId,
        view: &str,
        filter: &str,
        start: usize,
        count: i32,
        order_by: &str,
    ) -> Result<QueryResult> {
        self.get(view)?.query_in_transaction(tx, filter, start, count, order_by)
    }

    pub fn count(&self, view: &str, filter: &str) -> Result<usize> {
        self.get(view)?.count(filter)
    }

    pub fn save_index(&self) -> Result<()> {
        for handler in &self.handlers {
            handler.save_index()?;
        }
        Ok(())
    }

    pub fn free_memory(&self) -> Result<()> {
        for handler in &self.handlers {
            handler.free_memory()?;
        }
        Ok(())
    }

    pub fn approx_bytes(&self) -> usize {
        self.handlers.iter().map(|h| h.approx_bytes()).sum()
    }

    /// Drain background inserts, then flush every view.
    pub fn shutdown(&self) -> Result<()> {
        self.background.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                return Err(Error::new(ErrorKind::Internal, "Background indexer panicked".to_string()));
            }
        }

        let mut first_error = None;
        for handler in &self.handlers {
            if let Err(e) = handler.shutdown() {
                warn!("Shutdown of view '{}' failed: {}", handler.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Views firing on `doc_type`, primary first.
    fn firing(&self, doc_type: &str) -> Vec<&Arc<ViewHandler>> {
        let mut out: Vec<&Arc<ViewHandler>> = self.handlers.iter()
            .filter(|h| h.view().fires_on(doc_type))
            .collect();
        out.sort_by_key(|h| !h.view().is_primary_list);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::schema::ColumnType;

    fn views() -> Vec<View> {
        let invoices = View::new(
            ViewSchema::new("Invoices").column("Serial", ColumnType::Integer),
        ).primary().fire_on("Invoice");
        let totals = View::new(
            ViewSchema::new("InvoiceTotals").column("Total", ColumnType::Float),
        ).fire_on("Invoice").background();
        vec![totals, invoices]
    }

    #[test]
    fn routes_documents_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_storage_path(dir.path());
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let (manager, stale) = ViewManager::open(views(), &layout, &config).unwrap();
        assert_eq!(stale.len(), 2);

        assert_eq!(manager.view_name_for_type("invoice").as_deref(), Some("Invoices"));
        assert!(!manager.has_primary("Customer"));
        assert_eq!(manager.firing("Invoice")[0].name(), "Invoices");

        let doc = Document::new(DocId::new(), "Invoice")
            .with_field("Serial", 3i64)
            .with_field("Total", 9.5);
        manager.insert(doc.id, &doc).unwrap();
        manager.shutdown().unwrap();

        assert_eq!(manager.count("invoices", "Serial == 3").unwrap(), 1);
        assert_eq!(manager.count("InvoiceTotals", "Total > 9").unwrap(), 1);
        assert!(manager.count("nope", "").is_err());
    }

    #[test]
    fn duplicate_primary_views_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_storage_path(dir.path());
        let layout = StorageLayout::new(dir.path().to_path_buf()).unwrap();
        let mut views = views();
        views.push(View::new(ViewSchema::new("Other")).primary().fire_on("INVOICE"));

        let err = ViewManager::open(views, &layout, &config).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }
}
