//! Bulk import of captured `(url, title, timestamp)` rows from CSV.

use std::io::Read;
use std::path::Path;

use serde::Serialize;

use super::store::{HistoryError, HistoryStore, InsertOutcome};

const CSV_HEADERS: [&str; 3] = ["url", "title", "timestamp"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    History(#[from] HistoryError),
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub excluded: usize,
    /// Rows without a url
    pub skipped: usize,
}

pub fn import_csv_file(store: &HistoryStore, path: &Path) -> Result<ImportReport, ImportError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    import_csv(store, file)
}

/// Feed every row through `HistoryStore::insert`.
///
/// The header row is optional. A missing or empty timestamp becomes the
/// current UTC time in RFC 3339.
pub fn import_csv<R: Read>(store: &HistoryStore, reader: R) -> Result<ImportReport, ImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut report = ImportReport::default();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record?;

        if idx == 0 && record.iter().eq(CSV_HEADERS.iter().copied()) {
            continue;
        }

        let url = record.get(0).unwrap_or_default().trim();
        if url.is_empty() {
            report.skipped += 1;
            continue;
        }
        let title = record.get(1).unwrap_or_default().trim();
        let timestamp = match record.get(2).map(str::trim) {
            Some(ts) if !ts.is_empty() => ts.to_string(),
            _ => chrono::Utc::now().to_rfc3339(),
        };

        match store.insert(url, title, &timestamp)? {
            InsertOutcome::Inserted { .. } => report.inserted += 1,
            InsertOutcome::Duplicate => report.duplicates += 1,
            InsertOutcome::Excluded => report.excluded += 1,
        }
    }

    log::info!(
        "imported {} rows ({} duplicate, {} excluded, {} skipped)",
        report.inserted,
        report.duplicates,
        report.excluded,
        report.skipped
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_categories, default_exclude_domains};
    use crate::history::CategoryClassifier;

    fn open_store(dir: &Path) -> HistoryStore {
        HistoryStore::open(
            &dir.join("history.db"),
            CategoryClassifier::new(&default_categories()),
            None,
            default_exclude_domains(),
        )
        .unwrap()
    }

    #[test]
    fn test_import_with_header() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path());

        let data = "url,title,timestamp\n\
                    https://a.dev/1,LLM benchmarks,2024-01-01T00:00:00Z\n\
                    https://a.dev/1,LLM benchmarks again,2024-01-02T00:00:00Z\n\
                    https://twitter.com/x,Tweet,2024-01-03T00:00:00Z\n\
                    ,No url,\n\
                    https://a.dev/2,\"Stocks, bonds and more\",\n";

        let report = import_csv(&store, data.as_bytes()).unwrap();
        assert_eq!(
            report,
            ImportReport {
                inserted: 2,
                duplicates: 1,
                excluded: 1,
                skipped: 1,
            }
        );

        let entries = store.entries().unwrap();
        assert_eq!(entries[0].timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(entries[1].title, "Stocks, bonds and more");
        assert_eq!(entries[1].category, "Finance");
        assert!(chrono::DateTime::parse_from_rfc3339(&entries[1].timestamp).is_ok());
    }

    #[test]
    fn test_import_without_header() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path());

        let data = "https://a.dev/1,React 19,t1\nhttps://a.dev/2,Qiskit intro,t2\n";
        let report = import_csv(&store, data.as_bytes()).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_import_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path());
        let result = import_csv_file(&store, &tmp.path().join("missing.csv"));
        assert!(matches!(result, Err(ImportError::Csv(_))));
    }
}
