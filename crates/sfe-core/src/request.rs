use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Depth of a single `SearchAndFetch` call.
///
/// `Light` returns SERP metadata only (snippet as content); `Full` additionally
/// runs the extraction pipeline against the top results of each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Light,
    Full,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Light
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Raw, possibly `<search>...|...</search>`-tagged query text.
    pub raw_query: String,
    pub num_results: usize,
    pub mode: Mode,
    /// Free-form knobs (date_range, search_type, language, country, force_crawl, ...).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl SearchRequest {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(|s| s.as_str())
    }

    pub fn force_crawl(&self) -> bool {
        matches!(self.option("force_crawl"), Some("1" | "true" | "yes"))
    }
}

/// Result of splitting `raw_query` per the `<search>`/pipe grammar. Always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQueries {
    pub queries: Vec<String>,
}

impl ParsedQueries {
    pub fn is_parallel(&self) -> bool {
        self.queries.len() > 1
    }
}
