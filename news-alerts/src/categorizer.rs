use std::collections::BTreeMap;

use interfaces::{Category, CategorySet};
use serde::Deserialize;

const GEOPOLITICS_KEYWORDS: &[&str] = &[
    "war", "strike", "troops", "conflict", "border", "dispute", "treaty", "un", "nato",
    "military", "operation", "missile", "defense", "sanctions",
];

const ECONOMICS_KEYWORDS: &[&str] = &[
    "usd", "eur", "gold", "xau", "xauusd", "cpi", "nfp", "inflation", "rates", "fomc", "ecb",
    "fed", "imf", "balance of payments", "deficit", "gdp", "powell", "lagarde",
];

/// Keyword lists per category. Matching is a case-insensitive substring test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<Category, Vec<String>>")]
pub struct Taxonomy {
    keywords: BTreeMap<Category, Vec<String>>,
}

impl From<BTreeMap<Category, Vec<String>>> for Taxonomy {
    fn from(keywords: BTreeMap<Category, Vec<String>>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|(category, words)| {
                let words = words
                    .into_iter()
                    .map(|word| word.trim().to_lowercase())
                    .filter(|word| !word.is_empty())
                    .collect();
                (category, words)
            })
            .collect();
        Self { keywords }
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            Category::Geopolitics,
            GEOPOLITICS_KEYWORDS.iter().map(|word| word.to_string()).collect(),
        );
        keywords.insert(
            Category::Economics,
            ECONOMICS_KEYWORDS.iter().map(|word| word.to_string()).collect(),
        );
        Self::from(keywords)
    }
}

impl Taxonomy {
    /// Label `title` and `summary` with every category whose keyword list has a
    /// hit. An empty set means the item is not newsworthy.
    pub fn categorize(&self, title: &str, summary: &str) -> CategorySet {
        let text = format!("{title} {summary}").to_lowercase();

        self.keywords
            .iter()
            .filter(|(_, words)| words.iter().any(|word| text.contains(word.as_str())))
            .map(|(category, _)| *category)
            .collect()
    }

    pub fn keywords(&self, category: Category) -> &[String] {
        self.keywords.get(&category).map(Vec::as_slice).unwrap_or_default()
    }
}
