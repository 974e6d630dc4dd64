use crate::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    HtmlStructural,
    HostedCrawler,
    PdfParser,
    SnippetOnly,
    SerpFallback,
    SerpFallbackAfterFailure,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionMethod::HtmlStructural => "html_structural",
            ExtractionMethod::HostedCrawler => "hosted_crawler",
            ExtractionMethod::PdfParser => "pdf_parser",
            ExtractionMethod::SnippetOnly => "snippet_only",
            ExtractionMethod::SerpFallback => "serp_fallback",
            ExtractionMethod::SerpFallbackAfterFailure => "serp_fallback_after_failure",
        }
    }
}

/// Classification of an extraction failure, used both for response reporting and for
/// smart-skip bookkeeping (`sfe-local::memory`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Http403,
    Http404,
    RateLimited,
    Timeout,
    SslError,
    DnsError,
    ParseError,
    ConnectionError,
    Other,
}

impl FailureType {
    /// Classify a normalized (lowercased) error message via substring matching, per spec.
    pub fn classify(msg: &str) -> Self {
        let m = msg.to_ascii_lowercase();
        if m.contains("timed out") || m.contains("timeout") {
            FailureType::Timeout
        } else if m.contains("403") || m.contains("forbidden") {
            FailureType::Http403
        } else if m.contains("404") || m.contains("not found") {
            FailureType::Http404
        } else if m.contains("429") || m.contains("rate limit") || m.contains("too many requests")
        {
            FailureType::RateLimited
        } else if m.contains("ssl") || m.contains("tls") || m.contains("certificate") {
            FailureType::SslError
        } else if m.contains("dns") || m.contains("name resolution") || m.contains("lookup") {
            FailureType::DnsError
        } else if m.contains("parse") || m.contains("decode") || m.contains("empty") {
            FailureType::ParseError
        } else if m.contains("connect") || m.contains("connection") || m.contains("refused") {
            FailureType::ConnectionError
        } else {
            FailureType::Other
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub allow_fallback: bool,
    pub include_metadata: bool,
    pub max_content_bytes: usize,
    pub max_content_tokens: usize,
    pub single_url_timeout_ms: u64,
    pub force_crawl: bool,
}

/// Outcome of extracting one URL. Always returned, never panics, never escapes as an
/// unhandled error — failures are carried inside `error`/`success`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub success: bool,
    pub content: Option<String>,
    pub content_length: Option<usize>,
    pub estimated_tokens: Option<usize>,
    pub is_truncated: bool,
    pub extraction_method: ExtractionMethod,
    pub is_pdf: bool,
    pub error: Option<String>,
    pub is_serp_fallback: bool,
    pub confidence: Option<f64>,
    pub elapsed_ms: u128,
    pub is_timeout: bool,
    pub metadata: Option<serde_json::Value>,
}

impl FetchOutcome {
    pub fn snippet_only(content: String, elapsed_ms: u128) -> Self {
        Self {
            success: false,
            content: Some(content),
            content_length: None,
            estimated_tokens: None,
            is_truncated: false,
            extraction_method: ExtractionMethod::SnippetOnly,
            is_pdf: false,
            error: None,
            is_serp_fallback: false,
            confidence: None,
            elapsed_ms,
            is_timeout: false,
            metadata: None,
        }
    }
}

#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        url: &str,
        opts: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome>;
}
