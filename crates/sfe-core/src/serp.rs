use crate::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpOptions {
    pub num_results: Option<usize>,
    pub language: Option<String>,
    pub country: Option<String>,
    /// `h|d|w|m|y`, mapped to `tbs=qdr:<x>`.
    pub date_range: Option<String>,
    /// `web|news|images|videos|shopping|books`, mapped to `tbm`.
    pub search_type: Option<String>,
    pub page: Option<usize>,
}

impl Default for SerpOptions {
    fn default() -> Self {
        Self {
            num_results: Some(10),
            language: None,
            country: None,
            date_range: None,
            search_type: None,
            page: None,
        }
    }
}

/// One organic (or news) hit, normalized from a provider-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpResult {
    pub position: usize,
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub site: Option<String>,
    pub date: Option<String>,
    /// `"news"` for news-typed hits appended after organic results; absent otherwise.
    pub result_type: Option<String>,
}

#[async_trait::async_trait]
pub trait SerpClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        opts: &SerpOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SerpResult>>;
}
