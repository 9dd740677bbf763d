//! Browsing history: storage, categorization and capture import.

mod classify;
mod import;
mod keyphrase;
mod store;

pub use classify::CategoryClassifier;
pub use import::import_csv_file;
pub use keyphrase::KeyphraseExtractor;
pub use store::{HistoryError, HistoryStore, InsertOutcome};
