use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use crate::analysis::Analyzer;
use crate::bitmap::WahBitmap;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::transaction::TransactionId;
use crate::core::types::{DocId, Document, FieldValue};
use crate::index::{BoolIndex, ColumnIndex, CompareOp, IndexKey, OrderedIndex, RowIndex};
use crate::query::{Combine, Filter, FilterCache};
use crate::storage::doc_store::DocStore;
use crate::storage::record_log::RecordLog;
use crate::view::definition::{MapperApi, RowBatch, View};
use crate::view::row::{QueryResult, RowFiller, ViewRow};
use crate::view::schema::{Column, ColumnType, ViewSchema};

const VERSION_FILE: &str = "version_.dat";
const DELETED_FILE: &str = "deleted_.idx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Loading,
    Rebuilding,
    Ready,
}

/// One staged `insert_transaction` call.
#[derive(Debug, Clone)]
struct StagedInsert {
    docid: DocId,
    batches: Vec<RowBatch>,
}

/// Row store, column indexes and deletion bitmap of a single view.
///
/// Rows are appended to `{name}.mgdat` and never rewritten; the row number is
/// the record number. Retracted rows are only flagged in the deletion bitmap.
pub struct ViewHandler {
    view: View,
    schema: ViewSchema,
    dir: PathBuf,
    rows: RecordLog,
    docids: OrderedIndex,
    columns: Vec<ColumnIndex>,
    deleted: BoolIndex,
    filler: RowFiller,
    filters: FilterCache,
    analyzer: Analyzer,
    staged: Mutex<HashMap<TransactionId, Vec<StagedInsert>>>,
    writer: Mutex<()>,
    state: RwLock<ViewState>,
}

impl ViewHandler {
    /// Open the view under `dir`. The flag is true when the on-disk data was
    /// missing or stale and the caller has to [`rebuild`](Self::rebuild).
    pub fn open(view: View, dir: PathBuf, config: &Config) -> Result<(Self, bool)> {
        let schema = view.effective_schema();
        schema.validate()?;

        let existed = dir.exists();
        let needs_rebuild = match read_version(&dir)? {
            Some(stored) if stored >= view.version => false,
            Some(stored) => {
                info!("View '{}' version {} on disk, {} registered: rebuilding", view.name, stored, view.version);
                true
            }
            None => true,
        };

        if existed && needs_rebuild {
            debug!("Wiping {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let switchover = config.bitmap_switchover_count;
        let key_size = config.default_string_key_size;
        let name = view.name.to_lowercase();

        let rows = RecordLog::open(&dir.join(format!("{}.mgdat", name)))?;
        let docids = OrderedIndex::new(dir.join("docid.mgidx"), 16, switchover);
        let columns = schema.columns.iter()
            .map(|column| ColumnIndex::for_column(&dir, column, key_size, switchover))
            .collect();
        let deleted = BoolIndex::new(dir.join(DELETED_FILE), switchover);

        let handler = ViewHandler {
            filler: RowFiller::new(&schema),
            filters: FilterCache::new(config.filter_cache_size),
            analyzer: Analyzer::standard_english(),
            staged: Mutex::new(HashMap::new()),
            writer: Mutex::new(()),
            state: RwLock::new(ViewState::Loading),
            view,
            schema,
            dir,
            rows,
            docids,
            columns,
            deleted,
        };

        *handler.state.write() = if needs_rebuild { ViewState::Rebuilding } else { ViewState::Ready };
        info!("Opened view '{}' with {} rows", handler.view.name, handler.record_count());
        Ok((handler, needs_rebuild))
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn name(&self) -> &str {
        &self.view.name
    }

    pub fn schema(&self) -> &ViewSchema {
        &self.schema
    }

    pub fn state(&self) -> ViewState {
        *self.state.read()
    }

    /// Physical rows, deleted ones included.
    pub fn record_count(&self) -> u32 {
        self.rows.count()
    }

    /// Map and index a document. False when the mapper rolled back.
    pub fn insert(&self, docid: DocId, doc: &Document) -> Result<bool> {
        match self.map(docid, doc)? {
            Some(batches) => {
                self.save_and_index(docid, &batches)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Map a document into the transaction's stage. Nothing is indexed until
    /// [`commit`](Self::commit). False on rollback or mapper failure.
    pub fn insert_transaction(&self, tx: TransactionId, docid: DocId, doc: &Document) -> bool {
        let batches = match self.map(docid, doc) {
            Ok(Some(batches)) => batches,
            Ok(None) => return false,
            Err(e) => {
                warn!("View '{}': mapper failed for {}: {}", self.view.name, docid, e);
                return false;
            }
        };

        let mut staged = self.staged.lock();
        let pending = staged.entry(tx).or_default();
        if self.view.delete_before_insert {
            pending.retain(|s| s.docid != docid);
        }
        pending.push(StagedInsert { docid, batches });
        true
    }

    pub fn commit(&self, tx: TransactionId) -> Result<()> {
        let pending = self.staged.lock().remove(&tx).unwrap_or_default();
        for insert in pending {
            self.save_and_index(insert.docid, &insert.batches)?;
        }
        Ok(())
    }

    pub fn rollback(&self, tx: TransactionId) -> bool {
        self.staged.lock().remove(&tx).is_some()
    }

    /// Flag every row of `docid` as deleted.
    pub fn delete(&self, docid: DocId) -> Result<()> {
        let _writer = self.writer.lock();
        self.retract(docid)
    }

    pub fn query(&self, filter: &str, start: usize, count: i32, order_by: &str) -> Result<QueryResult> {
        let started = Instant::now();
        let hits = self.hits(filter)?;
        let total = hits.count_ones();
        let rows = self.return_rows(&hits, start, count, order_by)?;
        debug!("View '{}' query [{}] matched {} in {:?}", self.view.name, filter, total, started.elapsed());
        Ok(QueryResult::new(total, rows))
    }

    /// Like [`query`](Self::query), but also sees rows staged by `tx`. Staged
    /// rows come after the paged committed rows.
    pub fn query_in_transaction(
        &self,
        tx: TransactionId,
        filter: &str,
        start: usize,
        count: i32,
        order_by: &str,
    ) -> Result<QueryResult> {
        let pending = self.staged.lock().get(&tx).cloned().unwrap_or_default();
        if pending.is_empty() {
            return self.query(filter, start, count, order_by);
        }

        let mut hits = self.hits(filter)?;
        if self.view.delete_before_insert {
            for insert in &pending {
                hits = hits.and_not(&self.docid_rows(insert.docid)?);
            }
        }
        let total = hits.count_ones();
        let mut rows = self.return_rows(&hits, start, count, order_by)?;

        let parsed = self.filters.get_or_parse(filter)?;
        for batch in pending.iter().flat_map(|s| &s.batches) {
            for values in &batch.rows {
                let matched = match &parsed {
                    Some(f) => self.row_matches(f, batch.docid, values)?,
                    None => true,
                };
                if matched {
                    let mut tuple = Vec::with_capacity(values.len() + 1);
                    tuple.push(FieldValue::Guid(batch.docid.0));
                    tuple.extend(values.iter().cloned());
                    rows.push(self.filler.fill(tuple)?);
                }
            }
        }

        Ok(QueryResult::new(total, rows))
    }

    /// Number of live rows matching `filter`, without reading any row.
    pub fn count(&self, filter: &str) -> Result<usize> {
        Ok(self.hits(filter)?.count_ones())
    }

    /// Replay the document store through the mapper.
    pub fn rebuild(&self, docs: &DocStore) -> Result<()> {
        *self.state.write() = ViewState::Rebuilding;
        let started = Instant::now();
        let total = docs.record_count();
        info!("Rebuilding view '{}' from {} records", self.view.name, total);

        for record in 0..total {
            let item = docs.read(record)?;
            if item.deleted {
                self.delete(item.key)?;
                continue;
            }
            if !self.view.fires_on(&item.doc_type) {
                continue;
            }

            let doc: Document = match bincode::deserialize(&item.data) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("View '{}': skipping record {}: {}", self.view.name, record, e);
                    continue;
                }
            };
            if let Err(e) = self.insert(item.key, &doc) {
                warn!("View '{}': record {} not indexed: {}", self.view.name, record, e);
            }
        }

        self.save_index()?;
        self.write_version()?;
        *self.state.write() = ViewState::Ready;
        info!("Rebuilt view '{}': {} rows in {:?}", self.view.name, self.record_count(), started.elapsed());
        Ok(())
    }

    pub fn save_index(&self) -> Result<()> {
        self.rows.sync()?;
        self.docids.save()?;
        for index in &self.columns {
            index.save()?;
        }
        self.deleted.save()
    }

    pub fn free_memory(&self) -> Result<()> {
        self.docids.free_memory()?;
        for index in &self.columns {
            index.free_memory()?;
        }
        self.deleted.free_memory()?;
        self.filters.clear();
        Ok(())
    }

    pub fn approx_bytes(&self) -> usize {
        self.docids.approx_bytes()
            + self.columns.iter().map(|i| i.approx_bytes()).sum::<usize>()
            + self.deleted.approx_bytes()
    }

    /// Flush everything. The version stamp is written only once the view is
    /// fully built, so an interrupted rebuild restarts next time.
    pub fn shutdown(&self) -> Result<()> {
        let _writer = self.writer.lock();
        self.save_index()?;
        if self.state() == ViewState::Ready {
            self.write_version()?;
        }
        debug!("Shut down view '{}'", self.view.name);
        Ok(())
    }

    fn map(&self, docid: DocId, doc: &Document) -> Result<Option<Vec<RowBatch>>> {
        let mut api = MapperApi::new(&self.schema);
        match &self.view.mapper {
            Some(mapper) => mapper.map(&mut api, docid, doc)?,
            None => api.emit_object(docid, doc),
        }
        if api.is_rolled_back() {
            debug!("View '{}': mapper rolled back {}", self.view.name, docid);
            return Ok(None);
        }
        Ok(Some(api.into_batches()))
    }

    fn save_and_index(&self, docid: DocId, batches: &[RowBatch]) -> Result<()> {
        let _writer = self.writer.lock();
        if self.view.delete_before_insert {
            self.retract(docid)?;
            for batch in batches.iter().filter(|b| b.docid != docid) {
                self.retract(batch.docid)?;
            }
        }

        for batch in batches {
            for values in &batch.rows {
                self.append_row(batch.docid, values)?;
            }
        }
        Ok(())
    }

    fn append_row(&self, docid: DocId, values: &[FieldValue]) -> Result<()> {
        let row = self.rows.append(&RowFiller::encode(docid, values)?)?;
        self.docids.set(&IndexKey::Guid(docid.0), row)?;

        for ((column, index), value) in self.schema.columns.iter().zip(&self.columns).zip(values) {
            match IndexKey::coerce(value, column.column_type) {
                Ok(Some(key)) => index.set(&normalize(column, key), row)?,
                Ok(None) => {}
                Err(e) => warn!("View '{}' column '{}' row {}: {}", self.view.name, column.name, row, e),
            }
        }
        Ok(())
    }

    fn retract(&self, docid: DocId) -> Result<()> {
        let rows = self.docid_rows(docid)?;
        if !rows.is_empty() {
            self.deleted.in_place_or(&rows)?;
        }
        Ok(())
    }

    fn docid_rows(&self, docid: DocId) -> Result<WahBitmap> {
        self.docids.query(CompareOp::Equal, &IndexKey::Guid(docid.0), self.rows.count())
    }

    /// Live rows matching the filter text. Blank matches every live row.
    fn hits(&self, filter: &str) -> Result<WahBitmap> {
        let max = self.rows.count();
        let bits = match self.filters.get_or_parse(filter)? {
            Some(parsed) => self.compile(&parsed, max)?,
            None => WahBitmap::fill(max),
        };
        Ok(bits.and_not(&self.deleted.bits()?))
    }

    fn compile(&self, filter: &Filter, max: u32) -> Result<WahBitmap> {
        filter.evaluate(
            &mut |column, op, value| self.leaf(column, op, value, max),
            &|combine| match combine {
                Combine::And(a, b) => a.and(&b),
                Combine::Or(a, b) => a.or(&b),
                Combine::Not(a) => a.not(max),
            },
        )
    }

    fn leaf(&self, column: &str, op: CompareOp, value: &FieldValue, max: u32) -> Result<WahBitmap> {
        let (index, col): (&dyn RowIndex, Option<&Column>) = match self.schema.position(column) {
            Some(0) => (&self.docids as &dyn RowIndex, None),
            Some(pos) => (&self.columns[pos - 1] as &dyn RowIndex, Some(&self.schema.columns[pos - 1])),
            None => return Err(Error::query_compile(format!(
                "View '{}' has no column '{}'", self.view.name, column
            ))),
        };

        let key = match self.query_key(col, op, value)? {
            QueryKey::Key(key) => key,
            QueryKey::Nothing => return Ok(WahBitmap::new()),
            QueryKey::Everything => return Ok(WahBitmap::fill(max)),
        };
        index.query(op, &key, max)
    }

    fn query_key(&self, column: Option<&Column>, op: CompareOp, value: &FieldValue) -> Result<QueryKey> {
        if value.is_null() {
            return match op {
                CompareOp::Equal => Ok(QueryKey::Nothing),
                CompareOp::NotEqual => Ok(QueryKey::Everything),
                other => Err(Error::query_compile(format!("null cannot be compared with {}", other))),
            };
        }

        let column_type = column.map(|c| c.column_type).unwrap_or(ColumnType::Guid);
        let key = IndexKey::coerce(value, column_type)
            .map_err(|e| Error::query_compile(e.context))?
            .ok_or_else(|| Error::query_compile("null key"))?;
        Ok(QueryKey::Key(match column {
            Some(column) => normalize(column, key),
            None => key,
        }))
    }

    /// In-memory evaluation for staged rows, mirroring what the indexes answer.
    fn row_matches(&self, filter: &Filter, docid: DocId, values: &[FieldValue]) -> Result<bool> {
        filter.evaluate(
            &mut |column, op, literal| {
                let (col, cell) = match self.schema.position(column) {
                    Some(0) => (None, FieldValue::Guid(docid.0)),
                    Some(pos) => (
                        Some(&self.schema.columns[pos - 1]),
                        values.get(pos - 1).cloned().unwrap_or(FieldValue::Null),
                    ),
                    None => return Err(Error::query_compile(format!(
                        "View '{}' has no column '{}'", self.view.name, column
                    ))),
                };

                let wanted = match self.query_key(col, op, literal)? {
                    QueryKey::Key(key) => key,
                    QueryKey::Nothing => return Ok(false),
                    QueryKey::Everything => return Ok(true),
                };
                let column_type = col.map(|c| c.column_type).unwrap_or(ColumnType::Guid);
                let stored = match IndexKey::coerce(&cell, column_type) {
                    Ok(Some(key)) => match col {
                        Some(c) => normalize(c, key),
                        None => key,
                    },
                    _ => return Ok(false),
                };

                if column_type == ColumnType::FullText {
                    if !matches!(op, CompareOp::Equal | CompareOp::NotEqual) {
                        return Err(Error::query_compile(format!("{:?} is not valid on a full-text column", op)));
                    }
                    let have = self.analyzer.terms(&stored.to_field_value().to_string());
                    let need = self.analyzer.terms(&wanted.to_field_value().to_string());
                    let contained = !need.is_empty() && need.iter().all(|t| have.binary_search(t).is_ok());
                    return Ok(if op == CompareOp::NotEqual { !contained } else { contained });
                }

                Ok(match op {
                    CompareOp::Equal => stored == wanted,
                    CompareOp::NotEqual => stored != wanted,
                    CompareOp::Greater => stored > wanted,
                    CompareOp::GreaterOrEqual => stored >= wanted,
                    CompareOp::Less => stored < wanted,
                    CompareOp::LessOrEqual => stored <= wanted,
                })
            },
            &|combine| match combine {
                Combine::And(a, b) => a && b,
                Combine::Or(a, b) => a || b,
                Combine::Not(a) => !a,
            },
        )
    }

    /// Page through `hits`, following the sort order when there is one and
    /// emitting leftover hits in row order after it.
    fn return_rows(&self, hits: &WahBitmap, start: usize, count: i32, order_by: &str) -> Result<Vec<ViewRow>> {
        let limit = if count < 0 { usize::MAX } else { count as usize };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let selected: Vec<u32> = match self.sort_order(order_by)? {
            Some(order) => {
                let mut pending = vec![false; self.rows.count() as usize];
                for row in hits.bit_indexes() {
                    if let Some(slot) = pending.get_mut(row as usize) {
                        *slot = true;
                    }
                }

                let mut out = Vec::new();
                for row in order {
                    if let Some(slot) = pending.get_mut(row as usize) {
                        if *slot {
                            *slot = false;
                            out.push(row);
                        }
                    }
                }
                out.extend(hits.bit_indexes().filter(|r| pending.get(*r as usize).copied().unwrap_or(false)));
                out.into_iter().skip(start).take(limit).collect()
            }
            None => hits.bit_indexes().skip(start).take(limit).collect(),
        };

        selected.into_iter()
            .map(|row| self.filler.decode(&self.rows.read(row)?))
            .collect()
    }

    /// Row order for `order_by`: the longest column name it mentions, keys
    /// ascending. A trailing " desc" reverses the whole list, so rows sharing
    /// a key come newest first.
    fn sort_order(&self, order_by: &str) -> Result<Option<Vec<u32>>> {
        let order = order_by.trim().to_lowercase();
        if order.is_empty() {
            return Ok(None);
        }

        let found = self.schema.columns.iter()
            .enumerate()
            .filter(|(_, c)| order.contains(&c.name.to_lowercase()))
            .max_by_key(|(_, c)| c.name.len());
        let (pos, column) = match found {
            Some(found) => found,
            None => {
                debug!("View '{}': no column in order '{}'", self.view.name, order_by);
                return Ok(None);
            }
        };

        let index = &self.columns[pos];
        let max = self.rows.count();
        let mut rows = Vec::new();
        for key in index.keys()? {
            rows.extend(index.query(CompareOp::Equal, &key, max)?.bit_indexes());
        }
        if order.ends_with(" desc") {
            rows.reverse();
        }
        debug!("View '{}' sorted by '{}' over {} rows", self.view.name, column.name, rows.len());
        Ok(Some(rows))
    }

    fn write_version(&self) -> Result<()> {
        fs::write(self.dir.join(VERSION_FILE), self.view.version.to_le_bytes())?;
        Ok(())
    }
}

enum QueryKey {
    Key(IndexKey),
    Nothing,
    Everything,
}

fn normalize(column: &Column, key: IndexKey) -> IndexKey {
    match key {
        IndexKey::Text(s) if column.case_insensitive => IndexKey::Text(s.to_lowercase()),
        other => other,
    }
}

fn read_version(dir: &Path) -> Result<Option<u32>> {
    let path = dir.join(VERSION_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    match <[u8; 4]>::try_from(bytes.as_slice()) {
        Ok(raw) => Ok(Some(u32::from_le_bytes(raw))),
        Err(_) => {
            warn!("Unreadable {}, treating view as stale", path.display());
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::transaction::TransactionManager;

    fn invoice_view() -> View {
        let schema = ViewSchema::new("SalesInvoice")
            .column("CustomerName", ColumnType::Text)
            .column("Serial", ColumnType::Integer)
            .column("Approved", ColumnType::Boolean)
            .column("Notes", ColumnType::FullText);
        View::new(schema).primary().fire_on("Invoice").case_insensitive("CustomerName")
    }

    fn invoice(name: &str, serial: i64, approved: bool) -> Document {
        Document::new(DocId::new(), "Invoice")
            .with_field("CustomerName", name)
            .with_field("Serial", serial)
            .with_field("Approved", approved)
            .with_field("Notes", format!("order for {}", name))
    }

    fn open(dir: &Path) -> ViewHandler {
        let config = Config::with_storage_path(dir);
        ViewHandler::open(invoice_view(), dir.join("views/salesinvoice"), &config).unwrap().0
    }

    fn serials(result: &QueryResult) -> Vec<i64> {
        result.rows.iter()
            .map(|r| match r.get("Serial") {
                Some(FieldValue::Integer(s)) => *s,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    #[test]
    fn new_view_needs_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_storage_path(dir.path());
        let (handler, rebuild) = ViewHandler::open(invoice_view(), dir.path().join("v"), &config).unwrap();
        assert!(rebuild);
        assert_eq!(handler.state(), ViewState::Rebuilding);
    }

    #[test]
    fn filters_combine_bitmaps() {
        let dir = tempfile::tempdir().unwrap();
        let handler = open(dir.path());
        for i in 0..30 {
            let doc = invoice(if i % 2 == 0 { "Acme" } else { "Globex" }, i, i % 3 == 0);
            assert!(handler.insert(doc.id, &doc).unwrap());
        }

        assert_eq!(handler.count("Serial >= 25").unwrap(), 5);
        assert_eq!(handler.count("customername == 'ACME' and Serial < 10").unwrap(), 5);
        assert_eq!(handler.count("Approved == true or Serial == 1").unwrap(), 11);
        assert_eq!(handler.count("not Approved == true").unwrap(), 20);
        assert_eq!(handler.count("Notes == 'globex'").unwrap(), 15);
        assert_eq!(handler.count("").unwrap(), 30);
        assert_eq!(handler.count("Serial == null").unwrap(), 0);

        let err = handler.count("Missing == 1").unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueryCompile);
    }

    #[test]
    fn reinsert_retracts_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let handler = open(dir.path());
        let doc = invoice("Acme", 1, false);
        handler.insert(doc.id, &doc).unwrap();
        let updated = doc.clone().with_field("Serial", 2i64);
        handler.insert(doc.id, &updated).unwrap();

        let result = handler.query(&format!("docid == {}", doc.id), 0, -1, "").unwrap();
        assert_eq!(serials(&result), vec![2]);
        assert_eq!(handler.record_count(), 2);

        handler.delete(doc.id).unwrap();
        assert_eq!(handler.count("").unwrap(), 0);
        assert_eq!(handler.record_count(), 2);
    }

    #[test]
    fn paging_and_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let handler = open(dir.path());
        for serial in [5, 3, 9, 1, 7] {
            let doc = invoice("Acme", serial, false);
            handler.insert(doc.id, &doc).unwrap();
        }

        assert_eq!(serials(&handler.query("", 0, -1, "").unwrap()), vec![5, 3, 9, 1, 7]);
        assert_eq!(serials(&handler.query("", 0, -1, "Serial").unwrap()), vec![1, 3, 5, 7, 9]);
        assert_eq!(serials(&handler.query("", 0, -1, "serial desc").unwrap()), vec![9, 7, 5, 3, 1]);

        let page = handler.query("", 1, 2, "serial").unwrap();
        assert_eq!(serials(&page), vec![3, 5]);
        assert_eq!(page.total_count, 5);
        assert_eq!(page.count, 2);
    }

    #[test]
    fn descending_order_reverses_ties() {
        let dir = tempfile::tempdir().unwrap();
        let handler = open(dir.path());
        for (name, serial) in [("first", 1), ("second", 1), ("third", 2)] {
            let doc = invoice(name, serial, false);
            handler.insert(doc.id, &doc).unwrap();
        }

        let names = |order: &str| -> Vec<FieldValue> {
            handler.query("", 0, -1, order).unwrap().rows.iter()
                .map(|r| r.get("CustomerName").cloned().unwrap_or(FieldValue::Null))
                .collect()
        };
        assert_eq!(names("Serial"), vec!["first".into(), "second".into(), "third".into()]);
        assert_eq!(names("Serial desc"), vec!["third".into(), "second".into(), "first".into()]);
    }

    #[test]
    fn full_text_columns_reject_ordering_ops() {
        let dir = tempfile::tempdir().unwrap();
        let handler = open(dir.path());
        let doc = invoice("Acme", 1, false);
        handler.insert(doc.id, &doc).unwrap();

        assert_eq!(handler.count("Notes != 'acme'").unwrap(), 0);
        assert_eq!(handler.count("Notes > 'acme'").unwrap_err().kind, ErrorKind::QueryCompile);
    }

    #[test]
    fn transaction_rows_visible_only_to_their_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let handler = open(dir.path());
        let transactions = TransactionManager::new();
        let tx = transactions.begin();

        let doc = invoice("Acme", 42, true);
        assert!(handler.insert_transaction(tx, doc.id, &doc));
        assert_eq!(handler.count("Serial == 42").unwrap(), 0);

        let seen = handler.query_in_transaction(tx, "Serial == 42", 0, -1, "").unwrap();
        assert_eq!(seen.rows.len(), 1);

        handler.commit(tx).unwrap();
        assert_eq!(handler.count("Serial == 42").unwrap(), 1);

        let tx = transactions.begin();
        let other = invoice("Globex", 43, false);
        assert!(handler.insert_transaction(tx, other.id, &other));
        assert!(handler.rollback(tx));
        handler.commit(tx).unwrap();
        assert_eq!(handler.count("Serial == 43").unwrap(), 0);
    }

    #[test]
    fn mapper_rollback_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_storage_path(dir.path());
        let view = invoice_view().with_mapper(|api: &mut MapperApi, id: DocId, doc: &Document| {
            api.emit_object(id, doc);
            if doc.get_field("Serial") == Some(&FieldValue::Integer(13)) {
                api.rollback();
            }
            Ok(())
        });
        let (handler, _) = ViewHandler::open(view, dir.path().join("v"), &config).unwrap();

        let unlucky = invoice("Acme", 13, false);
        assert!(!handler.insert(unlucky.id, &unlucky).unwrap());
        assert_eq!(handler.record_count(), 0);
    }

    #[test]
    fn indexes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let handler = open(dir.path());
            *handler.state.write() = ViewState::Ready;
            for i in 0..12 {
                let doc = invoice("Acme", i, false);
                handler.insert(doc.id, &doc).unwrap();
            }
            handler.shutdown().unwrap();
        }

        let config = Config::with_storage_path(dir.path());
        let (handler, rebuild) = ViewHandler::open(invoice_view(), dir.path().join("views/salesinvoice"), &config).unwrap();
        assert!(!rebuild);
        assert_eq!(handler.count("Serial > 5").unwrap(), 6);

        let (_, rebuild) = ViewHandler::open(invoice_view().version(2), dir.path().join("views/salesinvoice"), &config).unwrap();
        assert!(rebuild);
    }
}
