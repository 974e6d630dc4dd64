//! The content extractor: detects a URL's content type, selects an extraction strategy, and
//! walks a bounded fallback chain {HTML_STRUCTURAL, HOSTED_CRAWLER, PDF_PARSER}.
//!
//! This implements `sfe_core::Extractor` in isolation from the failure-memory skip decision —
//! that substitution needs the SERP title/snippet and is applied by the orchestrator, which is
//! the only layer that has both the SERP result and this extractor.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use sfe_core::{Error, ExtractOptions, ExtractionMethod, Extractor, FetchOutcome, Result};

use crate::extract_html;
use crate::hosted_crawler::HostedCrawlerClient;
use crate::pdf;

const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; sfe-extractor/0.1; +https://example.invalid/bot)";
const HEAD_TIMEOUT: Duration = Duration::from_secs(5);
pub const TRUNCATION_MARKER: &str = "[content truncated]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Html,
    Pdf,
}

pub struct ContentExtractor {
    client: reqwest::Client,
    hosted: Option<HostedCrawlerClient>,
}

impl ContentExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        let hosted = HostedCrawlerClient::from_env(client.clone()).ok();
        Self { client, hosted }
    }

    fn looks_like_pdf_path(url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        let path = lower.split(['?', '#']).next().unwrap_or(&lower);
        path.ends_with(".pdf") || path.contains("/pdf/")
    }

    async fn detect_content_kind(&self, url: &str, cancel: &CancellationToken) -> ContentKind {
        if Self::looks_like_pdf_path(url) {
            return ContentKind::Pdf;
        }

        let head_fut = self
            .client
            .head(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(HEAD_TIMEOUT)
            .send();

        let resp = tokio::select! {
            r = head_fut => r,
            _ = cancel.cancelled() => return ContentKind::Html,
        };

        match resp {
            Ok(resp) => {
                let ct = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if ct.contains("application/pdf") {
                    ContentKind::Pdf
                } else {
                    ContentKind::Html
                }
            }
            Err(_) => ContentKind::Html,
        }
    }

    async fn fetch_html(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<serde_json::Value>)> {
        let send_fut = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(timeout)
            .send();

        let resp = tokio::select! {
            r = send_fut => r.map_err(|e| Error::Network(e.to_string()))?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        if !resp.status().is_success() {
            return Err(Error::Http(format!("html fetch HTTP {}", resp.status())));
        }
        let text_fut = resp.text();
        let body = tokio::select! {
            t = text_fut => t.map_err(|e| Error::Network(e.to_string()))?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let text = extract_html::html_to_text(&body, 100);
        if text.trim().is_empty() {
            return Err(Error::Decode("empty extracted text".to_string()));
        }
        let title = extract_html::extract_title(&body);
        let metadata = title.map(|t| serde_json::json!({ "title": t }));
        Ok((text, metadata))
    }

    async fn try_html_structural(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let t0 = Instant::now();
        match self.fetch_html(url, timeout, cancel).await {
            Ok((text, metadata)) => Ok(build_outcome(
                text,
                ExtractionMethod::HtmlStructural,
                false,
                metadata,
                t0.elapsed().as_millis(),
            )),
            Err(e) => Err(e),
        }
    }

    async fn try_hosted_crawler(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let t0 = Instant::now();
        let Some(hosted) = &self.hosted else {
            return Err(Error::NotConfigured("hosted crawler not configured".to_string()));
        };
        let result = hosted.fetch_markdown(url, cancel).await?;
        if result.markdown.trim().is_empty() {
            return Err(Error::Decode("hosted crawler returned empty content".to_string()));
        }
        Ok(build_outcome(
            result.markdown,
            ExtractionMethod::HostedCrawler,
            false,
            Some(result.metadata),
            t0.elapsed().as_millis(),
        ))
    }

    async fn try_pdf_parser(
        &self,
        url: &str,
        timeout: Duration,
        opts: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let t0 = Instant::now();
        let extraction =
            pdf::fetch_and_extract(&self.client, url, timeout, pdf::DEFAULT_MAX_PAGES, cancel)
                .await?;
        let (text, pdf_truncated) =
            pdf::truncate_to_token_cap(&extraction.text, opts.max_content_tokens);
        let metadata = serde_json::json!({
            "title": extraction.metadata.title,
            "page_count": extraction.metadata.page_count,
        });
        let mut outcome = build_outcome(
            text,
            ExtractionMethod::PdfParser,
            true,
            Some(metadata),
            t0.elapsed().as_millis(),
        );
        outcome.is_truncated = pdf_truncated;
        Ok(outcome)
    }

    /// Run one strategy under `budget`, the time remaining of `opts.single_url_timeout_ms`
    /// after earlier strategies in the same fallback chain have already spent some of it — the
    /// whole `Extract()` call gets one timeout budget, not one per strategy attempted. On
    /// timeout, returns a TIMEOUT outcome directly — per spec, a timeout stops the fallback
    /// chain rather than advancing it.
    async fn run_bounded<F>(
        budget: Duration,
        cancel: &CancellationToken,
        is_pdf: bool,
        fut: F,
    ) -> std::result::Result<Result<FetchOutcome>, FetchOutcome>
    where
        F: std::future::Future<Output = Result<FetchOutcome>>,
    {
        tokio::select! {
            r = tokio::time::timeout(budget, fut) => match r {
                Ok(inner) => Ok(inner),
                Err(_) => Err(timeout_outcome(is_pdf)),
            },
            _ = cancel.cancelled() => Err(cancelled_outcome(is_pdf)),
        }
    }
}

fn timeout_outcome(is_pdf: bool) -> FetchOutcome {
    FetchOutcome {
        success: false,
        content: None,
        content_length: None,
        estimated_tokens: None,
        is_truncated: false,
        extraction_method: ExtractionMethod::HtmlStructural,
        is_pdf,
        error: Some("extraction timed out".to_string()),
        is_serp_fallback: false,
        confidence: None,
        elapsed_ms: 0,
        is_timeout: true,
        metadata: None,
    }
}

fn cancelled_outcome(is_pdf: bool) -> FetchOutcome {
    FetchOutcome {
        success: false,
        content: None,
        content_length: None,
        estimated_tokens: None,
        is_truncated: false,
        extraction_method: ExtractionMethod::HtmlStructural,
        is_pdf,
        error: Some("cancelled".to_string()),
        is_serp_fallback: false,
        confidence: None,
        elapsed_ms: 0,
        is_timeout: false,
        metadata: None,
    }
}

fn build_outcome(
    content: String,
    method: ExtractionMethod,
    is_pdf: bool,
    metadata: Option<serde_json::Value>,
    elapsed_ms: u128,
) -> FetchOutcome {
    FetchOutcome {
        success: true,
        content: Some(content),
        content_length: None,
        estimated_tokens: None,
        is_truncated: false,
        extraction_method: method,
        is_pdf,
        error: None,
        is_serp_fallback: false,
        confidence: None,
        elapsed_ms,
        is_timeout: false,
        metadata,
    }
}

/// Bytes reserved for `"{space}{TRUNCATION_MARKER}"` — cuts below leave this much room so the
/// marker never pushes `content_length`/`estimated_tokens` back over the configured caps.
const MARKER_RESERVE: usize = TRUNCATION_MARKER.len() + 1;

/// Apply the byte cap, then the token cap (char/4 heuristic), per spec post-processing. Reserves
/// room for `TRUNCATION_MARKER` before cutting so the marker itself can never push either cap
/// back over budget.
pub fn post_process(mut outcome: FetchOutcome, opts: &ExtractOptions) -> FetchOutcome {
    let Some(content) = outcome.content.take() else {
        return outcome;
    };

    // Carry forward truncation already applied upstream (e.g. PDF_PARSER's own token-cap pass)
    // so a no-op call through here doesn't clear the flag.
    let mut truncated = outcome.is_truncated;
    let mut bytes = content.into_bytes();
    if bytes.len() > opts.max_content_bytes {
        let budget = opts.max_content_bytes.saturating_sub(MARKER_RESERVE);
        let cut = safe_utf8_boundary(&bytes, budget);
        bytes.truncate(cut);
        truncated = true;
    }
    let mut content = String::from_utf8(bytes).unwrap_or_default();

    let estimated_tokens = content.chars().count() / 4;
    if estimated_tokens > opts.max_content_tokens {
        let max_total_chars = opts.max_content_tokens.saturating_mul(4);
        let budget_chars = max_total_chars.saturating_sub(MARKER_RESERVE);
        let cut = content
            .char_indices()
            .nth(budget_chars)
            .map(|(i, _)| i)
            .unwrap_or(content.len());
        content.truncate(cut);
        truncated = true;
    }

    if truncated && !content.ends_with(TRUNCATION_MARKER) {
        content.push(' ');
        content.push_str(TRUNCATION_MARKER);
    }

    outcome.content_length = Some(content.len());
    outcome.estimated_tokens = Some(content.chars().count() / 4);
    outcome.is_truncated = truncated;
    outcome.content = Some(content);
    outcome
}

fn safe_utf8_boundary(bytes: &[u8], max_len: usize) -> usize {
    let n = max_len.min(bytes.len());
    if n == bytes.len() || std::str::from_utf8(&bytes[..n]).is_ok() {
        return n;
    }
    for back in 1..=4 {
        if n >= back && std::str::from_utf8(&bytes[..(n - back)]).is_ok() {
            return n - back;
        }
    }
    0
}

#[async_trait]
impl Extractor for ContentExtractor {
    async fn extract(
        &self,
        url: &str,
        opts: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let t0 = Instant::now();
        let kind = self.detect_content_kind(url, cancel).await;

        let chain: Vec<&str> = match kind {
            ContentKind::Pdf => {
                if opts.allow_fallback {
                    vec!["pdf", "hosted", "html"]
                } else {
                    vec!["pdf"]
                }
            }
            ContentKind::Html => {
                if opts.allow_fallback {
                    vec!["html", "hosted"]
                } else {
                    vec!["html"]
                }
            }
        };

        let is_pdf = kind == ContentKind::Pdf;
        // One shared deadline for the whole call: each strategy in the fallback chain draws
        // down the same `single_url_timeout_ms` budget instead of getting a fresh one.
        let deadline = Instant::now() + Duration::from_millis(opts.single_url_timeout_ms);
        let mut last_err: Option<String> = None;
        for (i, strategy) in chain.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let mut outcome = timeout_outcome(is_pdf);
                outcome.elapsed_ms = t0.elapsed().as_millis();
                return Ok(outcome);
            }
            let attempt = match *strategy {
                "pdf" => {
                    Self::run_bounded(
                        remaining,
                        cancel,
                        is_pdf,
                        self.try_pdf_parser(url, remaining, opts, cancel),
                    )
                    .await
                }
                "html" => {
                    Self::run_bounded(
                        remaining,
                        cancel,
                        is_pdf,
                        self.try_html_structural(url, remaining, cancel),
                    )
                    .await
                }
                "hosted" => {
                    Self::run_bounded(
                        remaining,
                        cancel,
                        is_pdf,
                        self.try_hosted_crawler(url, cancel),
                    )
                    .await
                }
                _ => unreachable!(),
            };

            match attempt {
                Ok(Ok(mut outcome)) => {
                    outcome.elapsed_ms = t0.elapsed().as_millis();
                    return Ok(post_process(outcome, opts));
                }
                Ok(Err(e)) => {
                    last_err = Some(e.to_string());
                    if i + 1 == chain.len() {
                        break;
                    }
                    continue;
                }
                // Timeout or cancellation: stop the chain immediately, do not try the remaining
                // fallback strategies.
                Err(mut outcome) => {
                    outcome.elapsed_ms = t0.elapsed().as_millis();
                    return Ok(outcome);
                }
            }
        }

        Ok(FetchOutcome {
            success: false,
            content: None,
            content_length: None,
            estimated_tokens: None,
            is_truncated: false,
            extraction_method: ExtractionMethod::HtmlStructural,
            is_pdf: matches!(kind, ContentKind::Pdf),
            error: last_err.or_else(|| Some("extraction failed".to_string())),
            is_serp_fallback: false,
            confidence: None,
            elapsed_ms: t0.elapsed().as_millis(),
            is_timeout: false,
            metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(max_bytes: usize, max_tokens: usize) -> ExtractOptions {
        ExtractOptions {
            allow_fallback: true,
            include_metadata: true,
            max_content_bytes: max_bytes,
            max_content_tokens: max_tokens,
            single_url_timeout_ms: 15_000,
            force_crawl: false,
        }
    }

    #[test]
    fn pdf_path_detection() {
        assert!(ContentExtractor::looks_like_pdf_path("https://example.com/foo.pdf"));
        assert!(ContentExtractor::looks_like_pdf_path("https://example.com/pdf/123"));
        assert!(ContentExtractor::looks_like_pdf_path("https://example.com/foo.PDF?x=1"));
        assert!(!ContentExtractor::looks_like_pdf_path("https://example.com/foo.html"));
    }

    #[test]
    fn post_process_is_noop_within_limits() {
        let outcome = build_outcome("hello world".to_string(), ExtractionMethod::HtmlStructural, false, None, 1);
        let out = post_process(outcome, &opts(10_000, 3_000));
        assert!(!out.is_truncated);
        assert_eq!(out.content.as_deref(), Some("hello world"));
    }

    #[test]
    fn post_process_truncates_by_bytes_and_marks() {
        let outcome = build_outcome("x".repeat(100), ExtractionMethod::HtmlStructural, false, None, 1);
        let out = post_process(outcome, &opts(10, 3_000));
        assert!(out.is_truncated);
        assert!(out.content.unwrap().ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn post_process_truncates_by_token_cap() {
        let outcome = build_outcome("word ".repeat(10_000), ExtractionMethod::HtmlStructural, false, None, 1);
        let out = post_process(outcome, &opts(1_000_000, 100));
        assert!(out.is_truncated);
        assert!(out.estimated_tokens.unwrap() <= 100);
    }

    #[test]
    fn post_process_never_exceeds_caps_once_marker_is_appended() {
        let outcome = build_outcome("x".repeat(200), ExtractionMethod::HtmlStructural, false, None, 1);
        let out = post_process(outcome, &opts(50, 3_000));
        assert!(out.is_truncated);
        assert!(out.content_length.unwrap() <= 50);
        let content = out.content.unwrap();
        assert_eq!(content.len(), out.content_length.unwrap());
        assert!(content.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn post_process_preserves_upstream_truncation_flag() {
        let mut outcome =
            build_outcome(format!("kept {TRUNCATION_MARKER}"), ExtractionMethod::PdfParser, true, None, 1);
        outcome.is_truncated = true;
        let out = post_process(outcome, &opts(10_000, 3_000));
        assert!(out.is_truncated);
    }

    #[test]
    fn post_process_is_idempotent() {
        let outcome = build_outcome("x".repeat(100), ExtractionMethod::HtmlStructural, false, None, 1);
        let options = opts(10, 3_000);
        let once = post_process(outcome, &options);
        let twice = post_process(once.clone(), &options);
        assert_eq!(once.content, twice.content);
        assert_eq!(once.is_truncated, twice.is_truncated);
    }
}
