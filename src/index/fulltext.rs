use std::path::PathBuf;
use crate::analysis::Analyzer;
use crate::bitmap::WahBitmap;
use crate::core::error::{Error, Result};
use crate::index::key::IndexKey;
use crate::index::store::BitmapStore;
use crate::index::{CompareOp, RowIndex};

/// Inverted index: analyzed term → rows containing it.
pub struct FullTextIndex {
    store: BitmapStore<String>,
    analyzer: Analyzer,
}

impl FullTextIndex {
    pub fn new(path: PathBuf, switchover: usize) -> Self {
        FullTextIndex {
            store: BitmapStore::new(path, switchover),
            analyzer: Analyzer::standard_english(),
        }
    }

    pub fn index_text(&self, row: u32, text: &str) -> Result<()> {
        let terms = self.analyzer.terms(text);
        if terms.is_empty() {
            return Ok(());
        }
        let switchover = self.store.switchover();
        self.store.write(|entries| {
            for term in terms {
                entries.entry(term)
                    .or_insert_with(|| WahBitmap::with_switchover(switchover))
                    .set(row, true);
            }
        })
    }

    /// Rows containing every term of `text`. No terms, no rows.
    pub fn search(&self, text: &str) -> Result<WahBitmap> {
        let terms = self.analyzer.terms(text);
        if terms.is_empty() {
            return Ok(WahBitmap::new());
        }

        self.store.read(|entries| {
            let mut result: Option<WahBitmap> = None;
            for term in &terms {
                let bits = match entries.get(term) {
                    Some(bits) => bits,
                    None => return WahBitmap::new(),
                };
                result = Some(match result {
                    Some(acc) => acc.and(bits),
                    None => bits.clone(),
                });
            }
            result.unwrap_or_default()
        })
    }
}

impl RowIndex for FullTextIndex {
    fn set(&self, key: &IndexKey, row: u32) -> Result<()> {
        match key {
            IndexKey::Text(text) => self.index_text(row, text),
            other => self.index_text(row, &other.to_field_value().to_string()),
        }
    }

    fn query(&self, op: CompareOp, key: &IndexKey, max_size: u32) -> Result<WahBitmap> {
        let negate = match op {
            CompareOp::Equal => false,
            CompareOp::NotEqual => true,
            other => return Err(Error::query_compile(format!("{:?} is not valid on a full-text column", other))),
        };
        let hits = self.search(&key.to_field_value().to_string())?;
        Ok(if negate { hits.not(max_size) } else { hits })
    }

    /// Full-text columns are not sortable.
    fn keys(&self) -> Result<Vec<IndexKey>> {
        Ok(Vec::new())
    }

    fn save(&self) -> Result<()> {
        self.store.save()
    }

    fn free_memory(&self) -> Result<()> {
        self.store.free_memory()
    }

    fn approx_bytes(&self) -> usize {
        self.store.approx_bytes(|term| term.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_terms_must_match() {
        let dir = tempfile::tempdir().unwrap();
        let index = FullTextIndex::new(dir.path().join("notes.idx"), 10);
        index.index_text(0, "Shipped the blue widgets").unwrap();
        index.index_text(1, "Blue paint invoice").unwrap();
        index.index_text(2, "widget returned").unwrap();

        let rows = |q: &str| index.search(q).unwrap().bit_indexes().collect::<Vec<_>>();
        assert_eq!(rows("blue"), vec![0, 1]);
        assert_eq!(rows("Widget"), vec![0, 2]);
        assert_eq!(rows("blue widget"), vec![0]);
        assert!(rows("green").is_empty());
        assert!(rows("").is_empty());
    }

    #[test]
    fn only_equality_compiles() {
        let dir = tempfile::tempdir().unwrap();
        let index = FullTextIndex::new(dir.path().join("notes.idx"), 10);
        index.index_text(0, "blue widget").unwrap();
        index.index_text(1, "red widget").unwrap();

        let key = IndexKey::Text("blue".to_string());
        let not_blue = index.query(CompareOp::NotEqual, &key, 2).unwrap();
        assert_eq!(not_blue.bit_indexes().collect::<Vec<_>>(), vec![1]);

        let err = index.query(CompareOp::Greater, &key, 2).unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::QueryCompile);
    }
}
