use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::{DatabaseStats, FailedViewStats, ViewStats};
use crate::core::transaction::{TransactionId, TransactionManager};
use crate::core::types::{DocId, Document};
use crate::index::{FullTextIndex, RowIndex};
use crate::storage::backup::{BackupManager, StoreKind};
use crate::storage::doc_store::DocStore;
use crate::storage::layout::StorageLayout;
use crate::view::{QueryResult, View, ViewManager, ViewRow, ViewSchema, ViewState};

/// A function callable by name from clients, run next to the data.
pub type ServerSideFn = Arc<dyn Fn(&Database, &str) -> Result<Vec<ViewRow>> + Send + Sync>;

/// Document store plus every registered view.
pub struct Database {
    config: Config,
    layout: StorageLayout,

    docs: Arc<DocStore>,
    files: Arc<DocStore>,
    fulltext: Arc<FullTextIndex>,
    views: Arc<ViewManager>,

    transactions: TransactionManager,
    backups: BackupManager,
    server_side: RwLock<HashMap<String, ServerSideFn>>,

    rebuilds: Mutex<Vec<JoinHandle<()>>>,
    maintenance: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
    start_time: SystemTime,
    shut_down: AtomicBool,
}

impl Database {
    /// Open (or create) the database under `config.storage_path`. Views whose
    /// stored data is missing or outdated are rebuilt on background threads.
    pub fn open(config: Config, views: Vec<View>) -> Result<Self> {
        let layout = StorageLayout::new(config.storage_path.clone())?;
        let docs = Arc::new(DocStore::open(&layout.docs_path())?);
        let files = Arc::new(DocStore::open(&layout.files_path())?);
        let fulltext = Arc::new(FullTextIndex::new(layout.fulltext_path(), config.bitmap_switchover_count));

        let (views, stale) = ViewManager::open(views, &layout, &config)?;
        let views = Arc::new(views);

        let mut rebuilds = Vec::new();
        for handler in stale {
            let docs = docs.clone();
            let name = handler.name().to_string();
            let rebuild = thread::Builder::new()
                .name(format!("rebuild-{}", name))
                .spawn(move || {
                    if let Err(e) = handler.rebuild(&docs) {
                        error!("Rebuild of view '{}' failed: {}", handler.name(), e);
                    }
                })?;
            rebuilds.push(rebuild);
        }

        let (stop, stopped) = bounded(1);
        let worker = {
            let views = views.clone();
            let fulltext = fulltext.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("index-maintenance".to_string())
                .spawn(move || maintenance_loop(stopped, views, fulltext, config))?
        };

        info!(
            "Opened database at {} ({} documents, {} views)",
            layout.base_dir.display(),
            docs.record_count(),
            views.handlers().len()
        );

        Ok(Database {
            backups: BackupManager::new(layout.clone()),
            transactions: TransactionManager::new(),
            server_side: RwLock::new(HashMap::new()),
            rebuilds: Mutex::new(rebuilds),
            maintenance: Mutex::new(Some((stop, worker))),
            start_time: SystemTime::now(),
            shut_down: AtomicBool::new(false),
            config,
            layout,
            docs,
            files,
            fulltext,
            views,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Store a document and index it in every view firing on its type.
    pub fn save(&self, docid: DocId, doc: &Document) -> Result<()> {
        self.check_primary(&doc.doc_type)?;
        self.store_document(docid, doc)?;
        self.views.insert(docid, doc)
    }

    pub fn save_bytes(&self, docid: DocId, bytes: Vec<u8>) -> Result<()> {
        self.files.set(docid, "", bytes)?;
        Ok(())
    }

    pub fn fetch(&self, docid: DocId) -> Result<Option<Document>> {
        match self.docs.get(&docid)? {
            Some(item) => Ok(Some(decode_document(&item.data)?)),
            None => Ok(None),
        }
    }

    pub fn fetch_bytes(&self, docid: DocId) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(&docid)?.map(|item| item.data))
    }

    /// Tombstone the document and retract its rows from every view. False
    /// when there was nothing to delete.
    pub fn delete(&self, docid: DocId) -> Result<bool> {
        if !self.docs.exists(&docid)? {
            return Ok(false);
        }
        self.docs.delete(docid)?;
        self.views.delete(docid)?;
        Ok(true)
    }

    pub fn delete_bytes(&self, docid: DocId) -> Result<bool> {
        if !self.files.exists(&docid)? {
            return Ok(false);
        }
        self.files.delete(docid)?;
        Ok(true)
    }

    /// Version numbers of every save of the document, oldest first.
    pub fn fetch_history(&self, docid: DocId) -> Result<Vec<u32>> {
        self.docs.history(&docid)
    }

    pub fn fetch_bytes_history(&self, docid: DocId) -> Result<Vec<u32>> {
        self.files.history(&docid)
    }

    pub fn fetch_version(&self, version: u32) -> Result<Option<Document>> {
        match self.docs.get_version(version)? {
            Some(item) => Ok(Some(decode_document(&item.data)?)),
            None => Ok(None),
        }
    }

    pub fn fetch_bytes_version(&self, version: u32) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get_version(version)?.map(|item| item.data))
    }

    /// `count` of -1 returns every match.
    pub fn query(&self, view: &str, filter: &str, start: usize, count: i32, order_by: &str) -> Result<QueryResult> {
        self.views.query(view, filter, start, count, order_by)
    }

    pub fn count(&self, view: &str, filter: &str) -> Result<usize> {
        self.views.count(view, filter)
    }

    /// Name of the primary view of a document type.
    pub fn view_name_for_type(&self, doc_type: &str) -> Option<String> {
        self.views.view_name_for_type(doc_type)
    }

    pub fn views(&self) -> Vec<String> {
        self.views.views()
    }

    pub fn view_schema(&self, view: &str) -> Result<ViewSchema> {
        self.views.schema(view)
    }

    pub fn begin(&self) -> TransactionId {
        let tx = self.transactions.begin();
        debug!("Began {}", tx);
        tx
    }

    /// Stage a document. Nothing is stored or indexed before
    /// [`commit`](Self::commit). False when a view's mapper refused the
    /// document, in which case the whole transaction has been rolled back.
    pub fn save_in_transaction(&self, tx: TransactionId, docid: DocId, doc: &Document) -> Result<bool> {
        self.transactions.check_active(tx)?;
        self.check_primary(&doc.doc_type)?;

        if !self.views.insert_transaction(tx, docid, doc) {
            self.transactions.discard(tx);
            return Ok(false);
        }
        self.transactions.stage(tx, docid, doc.clone())?;
        Ok(true)
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
        self.transactions.check_active(tx)?;
        self.views.query_in_transaction(tx, view, filter, start, count, order_by)
    }

    pub fn commit(&self, tx: TransactionId) -> Result<()> {
        let pending = self.transactions.take(tx)?;
        for (docid, doc) in &pending.documents {
            self.store_document(*docid, doc)?;
        }
        self.views.commit(tx)?;
        debug!("Committed {} with {} documents", tx, pending.documents.len());
        Ok(())
    }

    pub fn rollback(&self, tx: TransactionId) -> bool {
        self.views.rollback(tx);
        self.transactions.discard(tx)
    }

    /// Document versions whose string content contains every term of `text`.
    pub fn full_text_search(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self.fulltext.search(text)?.bit_indexes().collect())
    }

    pub fn register_server_side<F>(&self, name: &str, function: F)
    where
        F: Fn(&Database, &str) -> Result<Vec<ViewRow>> + Send + Sync + 'static,
    {
        self.server_side.write().insert(name.to_lowercase(), Arc::new(function));
    }

    pub fn server_side(&self, name: &str, filter: &str) -> Result<Vec<ViewRow>> {
        let function = self.server_side.read()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Server side function '{}' not registered", name)))?;
        function(self, filter)
    }

    /// Write every record added since the previous backup. False when there
    /// was nothing new.
    pub fn backup(&self) -> Result<bool> {
        self.backups.backup(&self.docs, &self.files)
    }

    /// Replay every archive waiting in the restore folder. Returns the number
    /// of records applied.
    pub fn restore(&self) -> Result<usize> {
        let mut applied = 0;
        for path in self.backups.pending_restores()? {
            info!("Restoring {}", path.display());
            for entry in self.backups.read_archive(&path)? {
                match entry.store {
                    StoreKind::Files => {
                        self.files.append(entry.item)?;
                    }
                    StoreKind::Documents if entry.item.deleted => {
                        let key = entry.item.key;
                        self.docs.append(entry.item)?;
                        self.views.delete(key)?;
                    }
                    StoreKind::Documents => {
                        let doc = decode_document(&entry.item.data)?;
                        let key = entry.item.key;
                        let record = self.docs.append(entry.item)?;
                        self.fulltext.index_text(record, &doc.text_content())?;
                        self.views.insert(key, &doc)?;
                    }
                }
                applied += 1;
            }
            self.backups.finish_restore(&path)?;
        }
        Ok(applied)
    }

    /// Flush every index to disk now.
    pub fn save_indexes(&self) -> Result<()> {
        save_indexes(&self.views, &self.fulltext)
    }

    /// Drop cached bitmaps; they reload from disk on next use.
    pub fn free_memory(&self) -> Result<()> {
        self.views.free_memory()?;
        self.fulltext.free_memory()
    }

    /// Block until every view rebuild started by `open` has finished.
    pub fn wait_for_rebuilds(&self) {
        let rebuilds: Vec<JoinHandle<()>> = self.rebuilds.lock().drain(..).collect();
        for rebuild in rebuilds {
            if rebuild.join().is_err() {
                error!("A view rebuild thread panicked");
            }
        }
    }

    pub fn stats(&self) -> DatabaseStats {
        let views = self.views.handlers().iter()
            .map(|h| ViewStats {
                name: h.name().to_string(),
                rows: h.record_count(),
                live_rows: h.count("").unwrap_or(0),
                index_memory_bytes: h.approx_bytes(),
                ready: h.state() == ViewState::Ready,
            })
            .collect::<Vec<_>>();
        let mut failed_views = self.views.failed()
            .map(|f| FailedViewStats { name: f.name.clone(), error: format!("{:?}: {}", f.kind, f.reason) })
            .collect::<Vec<_>>();
        failed_views.sort_by(|a, b| a.name.cmp(&b.name));

        DatabaseStats {
            uptime_secs: self.start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0),
            start_time: self.start_time,
            document_records: self.docs.record_count(),
            file_records: self.files.record_count(),
            index_memory_bytes: views.iter().map(|v| v.index_memory_bytes).sum::<usize>() + self.fulltext.approx_bytes(),
            memory_limit_bytes: self.config.memory_limit_bytes(),
            views,
            failed_views,
            active_transactions: self.transactions.active_count(),
            pending_rebuilds: self.rebuilds.lock().iter().filter(|r| !r.is_finished()).count(),
        }
    }

    /// Stop background work and flush everything. Safe to call twice.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Shutting down database at {}", self.layout.base_dir.display());

        if let Some((stop, worker)) = self.maintenance.lock().take() {
            let _ = stop.send(());
            if worker.join().is_err() {
                error!("Index maintenance thread panicked");
            }
        }
        self.wait_for_rebuilds();

        self.views.shutdown()?;
        self.fulltext.save()?;
        self.docs.sync()?;
        self.files.sync()?;
        info!("Shutdown complete");
        Ok(())
    }

    fn check_primary(&self, doc_type: &str) -> Result<()> {
        if self.config.require_primary_view && !self.views.has_primary(doc_type) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("No primary view defined for type '{}'", doc_type),
            ));
        }
        Ok(())
    }

    fn store_document(&self, docid: DocId, doc: &Document) -> Result<u32> {
        let record = self.docs.set(docid, &doc.doc_type, bincode::serialize(doc)?)?;
        self.fulltext.index_text(record, &doc.text_content())?;
        Ok(record)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Shutdown failed: {}", e);
        }
    }
}

fn decode_document(data: &[u8]) -> Result<Document> {
    bincode::deserialize(data).map_err(|e| Error::corruption(format!("Undecodable document: {}", e)))
}

fn save_indexes(views: &ViewManager, fulltext: &FullTextIndex) -> Result<()> {
    views.handlers().par_iter().try_for_each(|handler| handler.save_index())?;
    fulltext.save()
}

/// Periodically flushes indexes and frees cached bitmaps once they grow past
/// the memory limit. Exits when `stop` fires or its sender is dropped.
fn maintenance_loop(stop: Receiver<()>, views: Arc<ViewManager>, fulltext: Arc<FullTextIndex>, config: Config) {
    let save_every = config.save_index_interval();
    let free_every = config.free_memory_interval();
    let tick = save_every.min(free_every).max(Duration::from_millis(100));
    let mut last_save = Instant::now();
    let mut last_free = Instant::now();

    loop {
        match stop.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_save.elapsed() >= save_every {
            let started = Instant::now();
            match save_indexes(&views, &fulltext) {
                Ok(()) => debug!("Saved indexes in {:?}", started.elapsed()),
                Err(e) => warn!("Periodic index save failed: {}", e),
            }
            last_save = Instant::now();
        }

        if last_free.elapsed() >= free_every {
            let used = views.approx_bytes() + fulltext.approx_bytes();
            if used > config.memory_limit_bytes() {
                info!("Index memory {} bytes over limit, freeing", used);
                if let Err(e) = views.free_memory().and_then(|_| fulltext.free_memory()) {
                    warn!("Freeing index memory failed: {}", e);
                }
            }
            last_free = Instant::now();
        }
    }
    debug!("Index maintenance stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ColumnType;

    fn open(dir: &std::path::Path) -> Database {
        let view = View::new(
            ViewSchema::new("Notes").column("Title", ColumnType::Text),
        ).primary().fire_on("Note");
        let db = Database::open(Config::with_storage_path(dir), vec![view]).unwrap();
        db.wait_for_rebuilds();
        db
    }

    #[test]
    fn save_requires_primary_view() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        let orphan = Document::new(DocId::new(), "Orphan");
        let err = db.save(orphan.id, &orphan).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn versions_and_full_text() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        let note = Document::new(DocId::new(), "Note").with_field("Title", "Quarterly invoices");
        db.save(note.id, &note).unwrap();
        let edited = note.clone().with_field("Title", "Quarterly reports");
        db.save(note.id, &edited).unwrap();

        assert_eq!(db.fetch(note.id).unwrap(), Some(edited));
        let history = db.fetch_history(note.id).unwrap();
        assert_eq!(history, vec![0, 1]);
        assert_eq!(db.fetch_version(history[0]).unwrap(), Some(note));
        assert_eq!(db.full_text_search("invoice").unwrap(), vec![0]);
        assert_eq!(db.full_text_search("quarterly").unwrap(), vec![0, 1]);

        let stats = db.stats();
        assert_eq!(stats.document_records, 2);
        assert_eq!(stats.views[0].live_rows, 1);
    }

    #[test]
    fn server_side_functions_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path());
        db.register_server_side("AllNotes", |db: &Database, filter: &str| {
            Ok(db.query("Notes", filter, 0, -1, "")?.rows)
        });

        let note = Document::new(DocId::new(), "Note").with_field("Title", "x");
        db.save(note.id, &note).unwrap();
        assert_eq!(db.server_side("allnotes", "").unwrap().len(), 1);
        assert_eq!(db.server_side("missing", "").unwrap_err().kind, ErrorKind::NotFound);
    }
}
