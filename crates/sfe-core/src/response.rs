use crate::{ExtractionMethod, SerpResult};
use serde::{Deserialize, Serialize};

/// `SerpResult` merged with the `FetchOutcome` produced for it (or a light-mode stand-in).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub position: usize,
    pub search_index: usize,

    pub fetch_success: bool,
    pub fetch_reason: Option<String>,
    pub content: Option<String>,
    pub content_length: Option<usize>,
    pub estimated_tokens: Option<usize>,
    pub is_truncated: Option<bool>,
    pub extraction_method: ExtractionMethod,
    pub is_pdf: Option<bool>,
    pub is_serp_fallback: Option<bool>,
    pub skip_reason: Option<String>,
    pub confidence: Option<f64>,
    pub fetch_error: Option<String>,
    pub is_timeout: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

impl EnhancedResult {
    pub fn from_serp(result: &SerpResult, search_index: usize) -> Self {
        Self {
            url: result.url.clone(),
            title: result.title.clone(),
            snippet: result.snippet.clone(),
            position: result.position,
            search_index,
            fetch_success: false,
            fetch_reason: None,
            content: None,
            content_length: None,
            estimated_tokens: None,
            is_truncated: None,
            extraction_method: ExtractionMethod::SnippetOnly,
            is_pdf: None,
            is_serp_fallback: None,
            skip_reason: None,
            confidence: None,
            fetch_error: None,
            is_timeout: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDetail {
    pub query: String,
    pub query_index: usize,
    pub success: bool,
    pub results_count: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_results: usize,
    pub auto_fetched: usize,
    pub fetch_success: usize,
    pub pdf_count: usize,
    /// Milliseconds; wire key omits the `_ms` suffix per the response JSON schema.
    #[serde(rename = "search_elapsed")]
    pub search_elapsed_ms: u128,
    #[serde(rename = "fetch_elapsed")]
    pub fetch_elapsed_ms: u128,
    #[serde(rename = "total_elapsed")]
    pub total_elapsed_ms: u128,
    pub total_queries: Option<usize>,
    pub successful_queries: Option<usize>,
    pub query_details: Option<Vec<QueryDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Single,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub query: String,
    pub mode: crate::Mode,
    pub search_type: SearchType,
    pub parallel_queries: Option<Vec<String>>,
    pub results: Vec<EnhancedResult>,
    pub statistics: Statistics,
    pub request_id: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_wire_keys_omit_the_ms_suffix() {
        let stats = Statistics { search_elapsed_ms: 1, fetch_elapsed_ms: 2, total_elapsed_ms: 3, ..Default::default() };
        let v = serde_json::to_value(&stats).unwrap();
        assert_eq!(v["search_elapsed"], 1);
        assert_eq!(v["fetch_elapsed"], 2);
        assert_eq!(v["total_elapsed"], 3);
        assert!(v.get("search_elapsed_ms").is_none());
        assert!(v.get("fetch_elapsed_ms").is_none());
        assert!(v.get("total_elapsed_ms").is_none());
    }
}
