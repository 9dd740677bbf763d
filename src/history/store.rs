//! SQLite-backed record of visited pages.
//!
//! Every call opens its own connection and commits its own transaction, so
//! there are no long-lived write transactions. Racing inserts of the same url
//! are settled by the `UNIQUE` constraint: one row wins, the rest are ignored.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

use super::classify::CategoryClassifier;
use super::keyphrase::KeyphraseExtractor;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT UNIQUE,
    title TEXT,
    timestamp TEXT,
    category TEXT
);
";

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("history store io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub timestamp: String,
    pub category: String,
}

/// Result of an insert call. None of these are errors.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InsertOutcome {
    Inserted {
        id: i64,
        category: String,
        keyphrases: Vec<String>,
    },
    /// The url is already stored; the existing row is untouched.
    Duplicate,
    /// `netloc + path` contains an excluded substring.
    Excluded,
}

pub struct HistoryStore {
    path: PathBuf,
    classifier: CategoryClassifier,
    keyphrases: Option<KeyphraseExtractor>,
    exclude_domains: Vec<String>,
}

/// `netloc + path` of a url, as used for exclusion matching.
///
/// Taken verbatim from the raw string: host case and dot segments are kept.
/// Input without a `scheme://` prefix has no netloc, so it is all path.
pub fn url_domain(raw: &str) -> String {
    let end = raw.find(|c: char| c == '?' || c == '#').unwrap_or(raw.len());
    let without_query = &raw[..end];

    match without_query.split_once("://") {
        Some((_, rest)) => rest.to_string(),
        None => without_query.to_string(),
    }
}

impl HistoryStore {
    /// Open (creating if needed) the store at `path`.
    ///
    /// Fails if the database cannot be opened or its schema created.
    pub fn open(
        path: &Path,
        classifier: CategoryClassifier,
        keyphrases: Option<KeyphraseExtractor>,
        exclude_domains: Vec<String>,
    ) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self {
            path: path.to_path_buf(),
            classifier,
            keyphrases,
            exclude_domains,
        };

        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)?;
        log::info!("opened history store at {}", store.path.display());

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn classifier(&self) -> &CategoryClassifier {
        &self.classifier
    }

    fn connect(&self) -> Result<Connection, HistoryError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn is_excluded(&self, url: &str) -> bool {
        let domain = url_domain(url);
        self.exclude_domains
            .iter()
            .any(|exclude| domain.contains(exclude.as_str()))
    }

    pub fn insert(
        &self,
        url: &str,
        title: &str,
        timestamp: &str,
    ) -> Result<InsertOutcome, HistoryError> {
        if self.is_excluded(url) {
            log::debug!("skipping excluded url {url}");
            return Ok(InsertOutcome::Excluded);
        }

        let category = self.classifier.classify(title).to_string();

        let keyphrases = match &self.keyphrases {
            Some(extractor) => extractor.extract(title).unwrap_or_else(|err| {
                log::warn!("keyphrase extraction failed for {url:?}: {err}");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "INSERT OR IGNORE INTO history (url, title, timestamp, category) VALUES (?1, ?2, ?3, ?4)",
            params![url, title, timestamp, category],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        if changed == 0 {
            log::debug!("url already stored: {url}");
            return Ok(InsertOutcome::Duplicate);
        }

        log::debug!("stored #{id} [{category}] {title:?} keyphrases={keyphrases:?}");
        Ok(InsertOutcome::Inserted {
            id,
            category,
            keyphrases,
        })
    }

    /// All stored rows ordered by id.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT id, url, title, timestamp, category FROM history ORDER BY id")?;
        let rows = stmt.query_map([], Self::row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Full `id -> title` mapping.
    pub fn all_titles(&self) -> Result<HashMap<i64, String>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, title FROM history")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut titles = HashMap::new();
        for row in rows {
            let (id, title) = row?;
            titles.insert(id, title.unwrap_or_default());
        }
        Ok(titles)
    }

    /// Up to `n` distinct non-empty titles drawn uniformly at random,
    /// never one from `exclude`.
    pub fn random_distinct_titles(
        &self,
        n: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<String>, HistoryError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT title FROM history WHERE title IS NOT NULL AND title != ''",
        )?;
        let pool = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|title| !exclude.contains(title))
            .collect::<Vec<_>>();

        let mut rng = rand::rng();
        Ok(pool.choose_multiple(&mut rng, n).cloned().collect())
    }

    pub fn count(&self) -> Result<usize, HistoryError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn category_counts(&self) -> Result<BTreeMap<String, usize>, HistoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM history GROUP BY category")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (category, count) = row?;
            counts.insert(category, count as usize);
        }
        Ok(counts)
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
        Ok(HistoryEntry {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            timestamp: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            category: row.get(4)?,
        })
    }
}
