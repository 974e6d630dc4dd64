//! SERP client: submits a query to an external provider and polls until results are ready.
//!
//! Protocol: POST a query to the submit endpoint. The provider either answers synchronously
//! with a full result payload, or with `{"response_id": ...}` to be polled at the result
//! endpoint. Polling follows the progressive backoff table in [`poll_wait`].

use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use sfe_core::{Error, Result, SerpClient, SerpOptions, SerpResult};

fn api_key_from_env() -> Option<String> {
    std::env::var("SERP_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn zone_from_env() -> String {
    std::env::var("SERP_ZONE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "sfe_search".to_string())
}

fn poll_budget_from_env() -> Duration {
    let secs = std::env::var("SERP_POLL_BUDGET_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(30);
    Duration::from_secs(secs)
}

/// Progressive poll-wait schedule, fixed shape per the spec (attempt is 1-indexed).
pub fn poll_wait(attempt: u32) -> Duration {
    let secs = match attempt {
        1 => 2.0,
        2..=3 => 1.5,
        4..=6 => 2.0,
        7..=10 => 3.0,
        11..=12 => 4.0,
        _ => 5.0,
    };
    Duration::from_secs_f64(secs)
}

pub const MAX_POLL_ATTEMPTS: u32 = 20;
const SINGLE_POLL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SerpProvider {
    client: reqwest::Client,
    api_key: String,
    zone: String,
    poll_budget: Duration,
}

impl SerpProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = api_key_from_env()
            .ok_or_else(|| Error::NotConfigured("missing SERP_API_KEY".to_string()))?;
        Ok(Self {
            client,
            api_key,
            zone: zone_from_env(),
            poll_budget: poll_budget_from_env(),
        })
    }

    fn submit_endpoint() -> String {
        std::env::var("SERP_SUBMIT_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://api.serp-provider.example/req".to_string())
    }

    fn result_endpoint() -> String {
        std::env::var("SERP_RESULT_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://api.serp-provider.example/get_result".to_string())
    }

    fn build_params(query: &str, opts: &SerpOptions) -> serde_json::Value {
        let mut params = serde_json::Map::new();
        params.insert("q".to_string(), query.into());
        params.insert("brd_json".to_string(), 1.into());
        let num = opts.num_results.unwrap_or(10);
        params.insert("num".to_string(), num.into());

        if let Some(hl) = opts.language.as_deref() {
            params.insert("hl".to_string(), hl.into());
        }
        if let Some(gl) = opts.country.as_deref() {
            params.insert("gl".to_string(), gl.to_ascii_lowercase().into());
        }
        if let Some(page) = opts.page {
            if page > 1 {
                params.insert("start".to_string(), ((page - 1) * num).into());
            }
        }
        if let Some(range) = opts.date_range.as_deref() {
            params.insert("tbs".to_string(), format!("qdr:{range}").into());
        }
        if let Some(search_type) = opts.search_type.as_deref() {
            let tbm = match search_type {
                "news" => Some("nws"),
                "images" => Some("isch"),
                "videos" => Some("vid"),
                "shopping" => Some("shop"),
                "books" => Some("bks"),
                _ => None,
            };
            if let Some(tbm) = tbm {
                params.insert("tbm".to_string(), tbm.into());
            }
        }
        serde_json::Value::Object(params)
    }

    async fn poll(&self, response_id: &str, cancel: &CancellationToken) -> Result<serde_json::Value> {
        let poll_start = Instant::now();
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            if poll_start.elapsed() > self.poll_budget {
                return Err(Error::PollTimeout);
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let req = self
                .client
                .get(Self::result_endpoint())
                .query(&[("zone", self.zone.as_str()), ("response_id", response_id)])
                .timeout(SINGLE_POLL_TIMEOUT);

            let resp = tokio::select! {
                r = req.send() => r,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };

            match resp {
                Ok(resp) if resp.status().as_u16() == 200 => {
                    return resp
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| Error::Decode(e.to_string()));
                }
                Ok(resp) if resp.status().as_u16() == 202 => {
                    // Not ready yet; fall through to the backoff sleep below.
                }
                Ok(resp) => {
                    return Err(Error::Http(format!("serp poll HTTP {}", resp.status())));
                }
                Err(e) if e.is_timeout() => {
                    // Per-poll timeout: retry with the same schedule, does not restart it.
                }
                Err(e) => return Err(Error::Network(e.to_string())),
            }

            let wait = poll_wait(attempt);
            let remaining = self.poll_budget.saturating_sub(poll_start.elapsed());
            let wait = wait.min(remaining.max(Duration::from_millis(1)));
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            }
        }
        Err(Error::PollTimeout)
    }
}

#[derive(Debug, Deserialize)]
struct OrganicItem {
    link: Option<String>,
    title: Option<String>,
    description: Option<String>,
    display_link: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    link: Option<String>,
    title: Option<String>,
    description: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpPayload {
    #[serde(default)]
    organic: Vec<OrganicItem>,
    #[serde(default)]
    news: Vec<NewsItem>,
}

fn normalize(payload: serde_json::Value) -> Result<Vec<SerpResult>> {
    let payload: SerpPayload =
        serde_json::from_value(payload).map_err(|e| Error::Decode(e.to_string()))?;

    let mut out = Vec::new();
    for (i, item) in payload.organic.into_iter().enumerate() {
        let Some(url) = item.link else { continue };
        out.push(SerpResult {
            position: i + 1,
            url,
            title: item.title.unwrap_or_default(),
            snippet: item.description.unwrap_or_default(),
            site: item.display_link,
            date: item.date,
            result_type: None,
        });
    }
    for item in payload.news {
        let Some(url) = item.link else { continue };
        out.push(SerpResult {
            position: out.len() + 1,
            url,
            title: item.title.unwrap_or_default(),
            snippet: item.description.unwrap_or_default(),
            site: None,
            date: item.date,
            result_type: Some("news".to_string()),
        });
    }
    Ok(out)
}

#[async_trait]
impl SerpClient for SerpProvider {
    async fn search(
        &self,
        query: &str,
        opts: &SerpOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SerpResult>> {
        let body = serde_json::json!({
            "zone": self.zone,
            "query": Self::build_params(query, opts),
        });

        let send_fut = self
            .client
            .post(Self::submit_endpoint())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&body)
            .send();

        let resp = tokio::select! {
            r = send_fut => r.map_err(|e| Error::Network(e.to_string()))?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http(format!("serp submit HTTP {status}")));
        }

        let initial: serde_json::Value =
            resp.json().await.map_err(|e| Error::Decode(e.to_string()))?;

        let payload = if let Some(response_id) = initial.get("response_id").and_then(|v| v.as_str())
        {
            self.poll(response_id, cancel).await?
        } else {
            initial
        };

        normalize(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_schedule_matches_fixed_table() {
        assert_eq!(poll_wait(1), Duration::from_secs_f64(2.0));
        assert_eq!(poll_wait(2), Duration::from_secs_f64(1.5));
        assert_eq!(poll_wait(3), Duration::from_secs_f64(1.5));
        assert_eq!(poll_wait(4), Duration::from_secs_f64(2.0));
        assert_eq!(poll_wait(6), Duration::from_secs_f64(2.0));
        assert_eq!(poll_wait(7), Duration::from_secs_f64(3.0));
        assert_eq!(poll_wait(10), Duration::from_secs_f64(3.0));
        assert_eq!(poll_wait(11), Duration::from_secs_f64(4.0));
        assert_eq!(poll_wait(12), Duration::from_secs_f64(4.0));
        assert_eq!(poll_wait(13), Duration::from_secs_f64(5.0));
        assert_eq!(poll_wait(20), Duration::from_secs_f64(5.0));
    }

    #[test]
    fn normalizes_organic_and_news_into_one_sequence() {
        let payload = serde_json::json!({
            "organic": [
                {"link": "https://a.example", "title": "A", "description": "snip a", "display_link": "a.example"},
                {"link": "https://b.example", "title": "B", "description": "snip b"},
            ],
            "news": [
                {"link": "https://c.example", "title": "C", "description": "snip c", "date": "2024-01-01"},
            ],
        });
        let results = normalize(payload).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].position, 1);
        assert_eq!(results[1].position, 2);
        assert_eq!(results[2].position, 3);
        assert_eq!(results[2].result_type.as_deref(), Some("news"));
    }

    #[test]
    fn items_missing_link_are_dropped() {
        let payload = serde_json::json!({
            "organic": [
                {"link": "https://a.example", "title": "A", "description": "snip a"},
                {"title": "no-link"},
            ],
        });
        let results = normalize(payload).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.example");
    }

    #[test]
    fn build_params_maps_date_range_and_search_type() {
        let opts = SerpOptions {
            num_results: Some(5),
            language: Some("en".to_string()),
            country: Some("US".to_string()),
            date_range: Some("w".to_string()),
            search_type: Some("news".to_string()),
            page: Some(2),
        };
        let params = SerpProvider::build_params("rust async", &opts);
        assert_eq!(params["q"], "rust async");
        assert_eq!(params["num"], 5);
        assert_eq!(params["hl"], "en");
        assert_eq!(params["gl"], "us");
        assert_eq!(params["tbs"], "qdr:w");
        assert_eq!(params["tbm"], "nws");
        assert_eq!(params["start"], 5);
    }
}
