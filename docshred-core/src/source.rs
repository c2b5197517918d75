//! Document source (§6 "Input interface"): `DocumentSource.iterate(query) →
//! lazy sequence of JSON documents`, each carrying a sortable field for
//! audit bounds.
//!
//! The production collaborator (a MongoDB collection, say) is external to
//! this crate; [`InMemoryDocumentSource`] and [`NdjsonFileSource`] are the
//! in-process reference implementations used by tests and the demo CLI.

use std::fs;
use std::path::Path;

use crate::Result;

/// One extracted document: its raw JSON text plus an optional sort-key used
/// to compute the run's audit bounds (min/max, §6 "Exit behavior").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub raw: String,
    pub sort_key: Option<String>,
}

impl DocumentRecord {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            sort_key: None,
        }
    }

    pub fn with_sort_key(raw: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            sort_key: Some(sort_key.into()),
        }
    }
}

/// A source of raw documents to extract (§6 "Input interface").
pub trait DocumentSource {
    fn iterate(&self) -> Result<Vec<DocumentRecord>>;
}

/// Fixed in-memory collection of documents, for tests and small demos.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentSource {
    records: Vec<DocumentRecord>,
}

impl InMemoryDocumentSource {
    pub fn new(records: Vec<DocumentRecord>) -> Self {
        Self { records }
    }

    pub fn from_json_lines(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(lines.into_iter().map(|l| DocumentRecord::new(l)).collect())
    }
}

impl DocumentSource for InMemoryDocumentSource {
    fn iterate(&self) -> Result<Vec<DocumentRecord>> {
        Ok(self.records.clone())
    }
}

/// Reads one JSON document per line from a local NDJSON file (§10.1 demo
/// CLI's input format).
pub struct NdjsonFileSource {
    path: std::path::PathBuf,
}

impl NdjsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DocumentSource for NdjsonFileSource {
    fn iterate(&self) -> Result<Vec<DocumentRecord>> {
        let content = fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(DocumentRecord::new)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_source_returns_its_records_in_order() {
        let source = InMemoryDocumentSource::from_json_lines(["{\"a\":1}", "{\"a\":2}"]);
        let records = source.iterate().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw, "{\"a\":1}");
    }

    #[test]
    fn ndjson_file_source_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.ndjson");
        std::fs::write(&path, "{\"a\":1}\n\n{\"a\":2}\n").unwrap();
        let source = NdjsonFileSource::new(&path);
        let records = source.iterate().unwrap();
        assert_eq!(records.len(), 2);
    }
}
