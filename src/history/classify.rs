//! Rule-based category tagging for page titles.

use crate::config::CategoryRule;

/// Category assigned when no rule matches.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Maps a title to the first category in table order whose keyword list
/// contains a case-insensitive substring of the title.
#[derive(Clone, Debug)]
pub struct CategoryClassifier {
    /// (category name, lowercased keywords), in table order
    rules: Vec<(String, Vec<String>)>,
}

impl CategoryClassifier {
    pub fn new(rules: &[CategoryRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let keywords = rule
                    .keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                (rule.name.clone(), keywords)
            })
            .collect();

        Self { rules }
    }

    pub fn classify(&self, title: &str) -> &str {
        let title = title.to_lowercase();

        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| title.contains(k.as_str())))
            .map(|(name, _)| name.as_str())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(name, _)| name.as_str())
    }
}
