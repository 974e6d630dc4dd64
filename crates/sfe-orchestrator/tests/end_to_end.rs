//! End-to-end coverage of `Orchestrator::search_and_fetch` against local axum mock servers
//! standing in for the SERP provider and fetched pages, matching the literal scenarios this
//! crate's call contract is built against.

use axum::{response::IntoResponse, routing::post, Json, Router};
use serial_test::serial;
use sfe_core::{CancellationToken, Mode, SearchRequest, SearchType};
use sfe_orchestrator::{Orchestrator, OrchestratorConfig};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

struct EnvGuard {
    k: &'static str,
    prev: Option<String>,
}

impl EnvGuard {
    fn set(k: &'static str, v: &str) -> Self {
        let prev = std::env::var(k).ok();
        std::env::set_var(k, v);
        Self { k, prev }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(v) = self.prev.take() {
            std::env::set_var(self.k, v);
        } else {
            std::env::remove_var(self.k);
        }
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn req(raw_query: &str, num_results: usize, mode: Mode) -> SearchRequest {
    SearchRequest {
        raw_query: raw_query.to_string(),
        num_results,
        mode,
        options: BTreeMap::new(),
    }
}

fn build_orchestrator() -> Orchestrator {
    let client = sfe_local::build_http_client();
    let serp = sfe_local::SerpProvider::from_env(client.clone()).expect("serp from env");
    let extractor = sfe_local::ContentExtractor::new(client);
    let memory = sfe_local::InMemoryFailureMemory::new();
    Orchestrator::new(Arc::new(serp), Arc::new(extractor), Arc::new(memory), OrchestratorConfig::from_env())
}

#[tokio::test]
#[serial]
async fn single_light_search_returns_snippets_only() {
    let _key = EnvGuard::set("SERP_API_KEY", "test-key");
    let app = Router::new().route(
        "/req",
        post(|| async {
            Json(serde_json::json!({
                "organic": [
                    {"link": "https://a.example", "title": "A", "description": "snip a"},
                    {"link": "https://b.example", "title": "B", "description": "snip b"},
                    {"link": "https://c.example", "title": "C", "description": "snip c"},
                ]
            }))
        }),
    );
    let addr = serve(app).await;
    let _submit = EnvGuard::set("SERP_SUBMIT_ENDPOINT", &format!("http://{addr}/req"));
    let _result = EnvGuard::set("SERP_RESULT_ENDPOINT", &format!("http://{addr}/result"));

    let orch = build_orchestrator();
    let cancel = CancellationToken::new();
    let resp = orch
        .search_and_fetch(
            &req("<search>Python asyncio tutorial</search>", 3, Mode::Light),
            &cancel,
        )
        .await
        .expect("search_and_fetch");

    assert!(resp.success);
    assert!(matches!(resp.search_type, SearchType::Single));
    assert_eq!(resp.results.len(), 3);
    for (i, r) in resp.results.iter().enumerate() {
        assert!(!r.fetch_success);
        assert_eq!(r.fetch_reason.as_deref(), Some("light_mode"));
        assert_eq!(r.position, i + 1);
    }
    assert_eq!(resp.results[0].content.as_deref(), Some("snip a"));
    assert_eq!(resp.statistics.auto_fetched, 0);
}

#[tokio::test]
#[serial]
async fn single_full_search_fetches_and_extracts() {
    let _key = EnvGuard::set("SERP_API_KEY", "test-key");

    let content_app = Router::new().route(
        "/page",
        axum::routing::get(|| async {
            axum::response::Html("<html><head><title>LangGraph</title></head><body><p>LangGraph is a library for building stateful agents.</p></body></html>")
        }),
    );
    let content_addr = serve(content_app).await;
    let page_url = format!("http://{content_addr}/page");

    let serp_app = Router::new().route(
        "/req",
        post({
            let page_url = page_url.clone();
            move || {
                let page_url = page_url.clone();
                async move {
                    Json(serde_json::json!({
                        "organic": [
                            {"link": page_url, "title": "LangGraph", "description": "snip"},
                        ]
                    }))
                }
            }
        }),
    );
    let serp_addr = serve(serp_app).await;
    let _submit = EnvGuard::set("SERP_SUBMIT_ENDPOINT", &format!("http://{serp_addr}/req"));
    let _result = EnvGuard::set("SERP_RESULT_ENDPOINT", &format!("http://{serp_addr}/result"));

    let orch = build_orchestrator();
    let cancel = CancellationToken::new();
    let resp = orch
        .search_and_fetch(&req("LangGraph", 3, Mode::Full), &cancel)
        .await
        .expect("search_and_fetch");

    assert!(resp.success);
    assert_eq!(resp.results.len(), 1);
    let result = &resp.results[0];
    assert!(result.fetch_success);
    assert!(result.content.as_deref().unwrap().contains("stateful agents"));
    assert!(!result.is_truncated.unwrap_or(true));
    assert_eq!(resp.statistics.fetch_success, 1);
}

#[tokio::test]
#[serial]
async fn parallel_mixed_outcomes_one_query_fails() {
    let _key = EnvGuard::set("SERP_API_KEY", "test-key");
    let app = Router::new().route(
        "/req",
        post(|Json(body): Json<serde_json::Value>| async move {
            let q = body["query"]["q"].as_str().unwrap_or_default().to_string();
            if q == "B" {
                return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
            }
            Json(serde_json::json!({
                "organic": [
                    {"link": format!("https://{q}.example/1"), "title": q, "description": "snip 1"},
                    {"link": format!("https://{q}.example/2"), "title": q, "description": "snip 2"},
                ]
            }))
            .into_response()
        }),
    );
    let addr = serve(app).await;
    let _submit = EnvGuard::set("SERP_SUBMIT_ENDPOINT", &format!("http://{addr}/req"));
    let _result = EnvGuard::set("SERP_RESULT_ENDPOINT", &format!("http://{addr}/result"));

    let orch = build_orchestrator();
    let cancel = CancellationToken::new();
    let resp = orch
        .search_and_fetch(&req("<search>A|B|C</search>", 6, Mode::Light), &cancel)
        .await
        .expect("search_and_fetch");

    assert!(resp.success);
    assert!(matches!(resp.search_type, SearchType::Parallel));
    assert_eq!(resp.parallel_queries.as_deref(), Some(["A".to_string(), "B".to_string(), "C".to_string()].as_slice()));
    assert_eq!(resp.results.len(), 4);
    assert_eq!(resp.statistics.total_queries, Some(3));
    assert_eq!(resp.statistics.successful_queries, Some(2));
    let details = resp.statistics.query_details.unwrap();
    assert_eq!(details.len(), 3);
    assert!(details.iter().find(|d| d.query == "B").unwrap().error.is_some());
}

#[tokio::test]
#[serial]
async fn all_serp_queries_fail_is_serp_unavailable() {
    let _key = EnvGuard::set("SERP_API_KEY", "test-key");
    let app = Router::new().route(
        "/req",
        post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "down") }),
    );
    let addr = serve(app).await;
    let _submit = EnvGuard::set("SERP_SUBMIT_ENDPOINT", &format!("http://{addr}/req"));
    let _result = EnvGuard::set("SERP_RESULT_ENDPOINT", &format!("http://{addr}/result"));

    let orch = build_orchestrator();
    let cancel = CancellationToken::new();
    let err = orch
        .search_and_fetch(&req("<search>A|B|C</search>", 6, Mode::Light), &cancel)
        .await
        .expect_err("expected SERP_UNAVAILABLE");

    assert!(matches!(err, sfe_core::Error::SerpUnavailable(_)));
}
