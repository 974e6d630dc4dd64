//! HOSTED_CRAWLER extraction strategy: delegates to an external content-extraction service
//! that returns main-content Markdown, normalized regardless of the upstream SDK shape.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use sfe_core::{Error, Result};

fn api_key_from_env() -> Option<String> {
    std::env::var("HOSTED_CRAWLER_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

const TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HostedCrawlerClient {
    client: reqwest::Client,
    api_key: String,
}

impl HostedCrawlerClient {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = api_key_from_env()
            .ok_or_else(|| Error::NotConfigured("missing HOSTED_CRAWLER_API_KEY".to_string()))?;
        Ok(Self { client, api_key })
    }

    fn endpoint() -> String {
        std::env::var("HOSTED_CRAWLER_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://api.hosted-crawler.example/v2/scrape".to_string())
    }

    pub async fn fetch_markdown(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<HostedCrawlResult> {
        let t0 = Instant::now();

        let body = serde_json::json!({
            "url": url,
            "formats": ["markdown"],
            "onlyMainContent": true,
            "timeout": TIMEOUT.as_millis(),
        });

        let send_fut = self
            .client
            .post(Self::endpoint())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .timeout(TIMEOUT)
            .json(&body)
            .send();

        let resp = tokio::select! {
            r = send_fut => r.map_err(|e| Error::Network(e.to_string()))?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http(format!("hosted crawler HTTP {status}")));
        }

        let parsed: HostedScrapeResponse =
            resp.json().await.map_err(|e| Error::Decode(e.to_string()))?;
        if !parsed.success {
            return Err(Error::Http("hosted crawler returned success=false".to_string()));
        }

        let data = parsed.data.unwrap_or(HostedScrapeData {
            markdown: None,
            metadata: None,
        });
        Ok(HostedCrawlResult {
            markdown: data.markdown.unwrap_or_default(),
            metadata: data.metadata.unwrap_or(serde_json::Value::Null),
            elapsed_ms: t0.elapsed().as_millis(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct HostedCrawlResult {
    pub markdown: String,
    pub metadata: serde_json::Value,
    pub elapsed_ms: u128,
}

#[derive(Debug, Deserialize)]
struct HostedScrapeResponse {
    success: bool,
    data: Option<HostedScrapeData>,
}

#[derive(Debug, Deserialize, Clone)]
struct HostedScrapeData {
    markdown: Option<String>,
    metadata: Option<serde_json::Value>,
}
