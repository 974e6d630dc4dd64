//! `SearchAndFetch`: parses a request, runs SERP queries under a bounded gate, optionally
//! fetches and extracts the top results of each query under a second bounded gate, and
//! assembles a single response. This module owns all per-call mutable state; the failure
//! memory handed to [`Orchestrator::new`] is the only thing that outlives a call.

use std::sync::Arc;
use std::time::Instant;

use sfe_core::{
    CancellationToken, EnhancedResult, Error, ExtractOptions, Extractor, FailureMemory,
    FailureType, Mode, QueryDetail, Result, SearchRequest, SearchResponse, SearchType, SerpClient,
    SerpOptions, SerpResult, Statistics,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::snippet::format_snippet_view;

pub struct Orchestrator {
    serp: Arc<dyn SerpClient>,
    extractor: Arc<dyn Extractor>,
    memory: Arc<dyn FailureMemory>,
    config: OrchestratorConfig,
}

/// Outcome of running one query through the SERP client: either a ranked hit list or the
/// error that the query failed with (never aborts the whole call by itself).
struct QueryOutcome {
    query: String,
    query_index: usize,
    results: std::result::Result<Vec<SerpResult>, String>,
}

impl Orchestrator {
    pub fn new(
        serp: Arc<dyn SerpClient>,
        extractor: Arc<dyn Extractor>,
        memory: Arc<dyn FailureMemory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { serp, extractor, memory, config }
    }

    #[instrument(skip(self, req, cancel), fields(mode = ?req.mode, num_results = req.num_results))]
    pub async fn search_and_fetch(
        &self,
        req: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let t0 = Instant::now();

        if req.num_results < 1 {
            return Err(Error::InvalidRequest("num_results must be >= 1".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let parsed = sfe_local::query_parser::parse(&req.raw_query)?;
        let is_parallel = parsed.is_parallel();
        let queries = parsed.queries;

        let search_t0 = Instant::now();
        let outcomes = self.run_queries(&queries, req, cancel).await;
        let search_elapsed_ms = search_t0.elapsed().as_millis();

        let successful_queries = outcomes.iter().filter(|o| o.results.is_ok()).count();
        if successful_queries == 0 {
            return Err(Error::SerpUnavailable(format!(
                "all {} queries failed at the SERP layer",
                queries.len()
            )));
        }

        let query_details: Vec<QueryDetail> = outcomes
            .iter()
            .map(|o| QueryDetail {
                query: o.query.clone(),
                query_index: o.query_index,
                success: o.results.is_ok(),
                results_count: o.results.as_ref().ok().map(|r| r.len()),
                error: o.results.as_ref().err().cloned(),
            })
            .collect();

        let total_results: usize = outcomes
            .iter()
            .map(|o| o.results.as_ref().map(|r| r.len()).unwrap_or(0))
            .sum();

        let mut results: Vec<EnhancedResult> = Vec::with_capacity(total_results);
        let mut auto_fetched = 0usize;
        let mut fetch_success = 0usize;
        let mut pdf_count = 0usize;
        let fetch_t0 = Instant::now();

        match req.mode {
            Mode::Light => {
                for outcome in &outcomes {
                    let Ok(hits) = &outcome.results else { continue };
                    for hit in hits {
                        let mut enhanced = EnhancedResult::from_serp(hit, outcome.query_index);
                        enhanced.fetch_reason = Some("light_mode".to_string());
                        enhanced.content = Some(hit.snippet.clone());
                        results.push(enhanced);
                    }
                }
            }
            Mode::Full => {
                // N_U = min(N_U_max, K), K = num_results // Q (floor, min 1): more queries
                // sharing one `num_results` budget means less fetch concurrency per query.
                let q = queries.len().max(1);
                let k = (req.num_results / q).max(1);
                for outcome in &outcomes {
                    let Ok(hits) = &outcome.results else { continue };
                    let (fetched, carried) =
                        self.run_fetch_batch(hits, outcome.query_index, k, req, cancel).await;
                    for r in &fetched {
                        if r.fetch_success {
                            fetch_success += 1;
                        }
                        if r.is_pdf == Some(true) {
                            pdf_count += 1;
                        }
                    }
                    auto_fetched += fetched.len();
                    results.extend(fetched);
                    results.extend(carried);
                }
            }
        }
        let fetch_elapsed_ms = fetch_t0.elapsed().as_millis();

        results.sort_by_key(|r| (r.search_index, r.position));

        let statistics = Statistics {
            total_results,
            auto_fetched,
            fetch_success,
            pdf_count,
            search_elapsed_ms,
            fetch_elapsed_ms,
            total_elapsed_ms: t0.elapsed().as_millis(),
            total_queries: Some(queries.len()),
            successful_queries: Some(successful_queries),
            query_details: Some(query_details),
        };

        Ok(SearchResponse {
            success: true,
            query: req.raw_query.clone(),
            mode: req.mode,
            search_type: if is_parallel { SearchType::Parallel } else { SearchType::Single },
            parallel_queries: if is_parallel { Some(queries.clone()) } else { None },
            results,
            statistics,
            request_id: uuid::Uuid::new_v4().to_string(),
            error: None,
        })
    }

    async fn run_queries(
        &self,
        queries: &[String],
        req: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Vec<QueryOutcome> {
        let n_q = self.config.max_concurrent_queries.min(queries.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(n_q));
        let query_timeout = self.config.query_timeout(req.mode);
        let opts = SerpOptions {
            num_results: Some(req.num_results),
            language: req.option("language").map(str::to_string),
            country: req.option("country").map(str::to_string),
            date_range: req.option("date_range").map(str::to_string),
            search_type: req.option("search_type").map(str::to_string),
            page: req.option("page").and_then(|p| p.parse().ok()),
        };

        let mut set = JoinSet::new();
        for (query_index, query) in queries.iter().enumerate() {
            let semaphore = semaphore.clone();
            let serp = self.serp.clone();
            let query = query.clone();
            let opts = opts.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = tokio::select! {
                    r = tokio::time::timeout(query_timeout, serp.search(&query, &opts, &cancel)) => {
                        match r {
                            Ok(Ok(hits)) => Ok(hits),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(_) => Err("query timed out".to_string()),
                        }
                    }
                    _ = cancel.cancelled() => Err("cancelled".to_string()),
                };
                QueryOutcome { query, query_index, results: result }
            });
        }

        let mut outcomes = Vec::with_capacity(queries.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "query task panicked"),
            }
        }
        outcomes.sort_by_key(|o| o.query_index);
        outcomes
    }

    /// Runs fetch tasks for the top `auto_fetch_limit` hits of one query under the
    /// `N_U = min(N_U_max, k)` gate and the per-query `T_parallel_fetch` budget; the remainder
    /// are carried through as snippet-only entries. Returns `(fetched, carried)` so callers can
    /// tally statistics over the fetched subset only.
    async fn run_fetch_batch(
        &self,
        hits: &[SerpResult],
        query_index: usize,
        k: usize,
        req: &SearchRequest,
        cancel: &CancellationToken,
    ) -> (Vec<EnhancedResult>, Vec<EnhancedResult>) {
        if self.config.auto_fetch_limit == 0 {
            let carried = hits
                .iter()
                .map(|hit| {
                    let mut enhanced = EnhancedResult::from_serp(hit, query_index);
                    enhanced.fetch_reason = Some("auto_fetch_disabled".to_string());
                    enhanced.content = Some(hit.snippet.clone());
                    enhanced
                })
                .collect();
            return (Vec::new(), carried);
        }

        let (to_fetch, rest) = hits.split_at(hits.len().min(self.config.auto_fetch_limit));
        let carried = rest
            .iter()
            .map(|hit| {
                let mut enhanced = EnhancedResult::from_serp(hit, query_index);
                enhanced.fetch_reason = Some("exceeded_auto_fetch_limit".to_string());
                enhanced.content = Some(hit.snippet.clone());
                enhanced
            })
            .collect();

        if to_fetch.is_empty() {
            return (Vec::new(), carried);
        }

        let n_u = self.config.max_concurrent_fetch.min(k).max(1);
        let semaphore = Arc::new(Semaphore::new(n_u));
        let batch_cancel = cancel.child_token();

        let mut set = JoinSet::new();
        for hit in to_fetch {
            let semaphore = semaphore.clone();
            let hit = hit.clone();
            let cancel = batch_cancel.clone();
            let this = self.clone_for_fetch();
            let force_crawl = req.force_crawl();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                this.fetch_one(&hit, query_index, force_crawl, &cancel).await
            });
        }

        let budget = self.config.parallel_fetch_timeout;
        let mut fetched = Vec::with_capacity(to_fetch.len());
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                batch_cancel.cancel();
                break;
            }
            match tokio::time::timeout(remaining, set.join_next()).await {
                Ok(Some(Ok(enhanced))) => fetched.push(enhanced),
                Ok(Some(Err(e))) => warn!(error = %e, "fetch task panicked"),
                Ok(None) => break,
                Err(_) => {
                    batch_cancel.cancel();
                    break;
                }
            }
        }

        // Anything still outstanding after the batch deadline is recorded as cancelled so the
        // response accounts for every requested fetch.
        let completed_urls: std::collections::HashSet<&str> =
            fetched.iter().map(|r| r.url.as_str()).collect();
        for hit in to_fetch {
            if !completed_urls.contains(hit.url.as_str()) {
                let mut enhanced = EnhancedResult::from_serp(hit, query_index);
                enhanced.fetch_success = false;
                enhanced.fetch_error = Some("cancelled".to_string());
                enhanced.is_timeout = Some(false);
                fetched.push(enhanced);
            }
        }

        (fetched, carried)
    }

    /// Cheap clone of just the pieces `fetch_one` needs, so each spawned fetch task owns its
    /// own handle instead of borrowing `self` across an `.await`.
    fn clone_for_fetch(&self) -> FetchContext {
        FetchContext {
            extractor: self.extractor.clone(),
            memory: self.memory.clone(),
            config: self.config.clone(),
        }
    }
}

struct FetchContext {
    extractor: Arc<dyn Extractor>,
    memory: Arc<dyn FailureMemory>,
    config: OrchestratorConfig,
}

impl FetchContext {
    async fn fetch_one(
        &self,
        hit: &SerpResult,
        query_index: usize,
        force_crawl: bool,
        cancel: &CancellationToken,
    ) -> EnhancedResult {
        let mut enhanced = EnhancedResult::from_serp(hit, query_index);

        if !force_crawl && self.config.enable_failure_learning {
            let decision = self.memory.should_skip(&hit.url).await;
            if decision.should_skip {
                enhanced.fetch_success = true;
                enhanced.extraction_method = sfe_core::ExtractionMethod::SerpFallback;
                enhanced.is_serp_fallback = Some(true);
                enhanced.content =
                    Some(format_snippet_view(&hit.title, &hit.snippet, &hit.url));
                enhanced.skip_reason = Some(decision.reason);
                enhanced.confidence = Some(decision.confidence);
                enhanced.fetch_reason = Some("smart_skip".to_string());
                return enhanced;
            }
        }

        let opts = ExtractOptions {
            allow_fallback: true,
            include_metadata: true,
            max_content_bytes: self.config.max_content_bytes,
            max_content_tokens: self.config.max_content_tokens,
            single_url_timeout_ms: self.config.single_url_timeout.as_millis() as u64,
            force_crawl,
        };

        match self.extractor.extract(&hit.url, &opts, cancel).await {
            Ok(outcome) => {
                // Cancellation (our own batch/outer deadline, not a host-side failure) must
                // never be recorded as a host failure, same as a timeout.
                let is_cancellation = outcome.error.as_deref() == Some("cancelled");
                if self.config.enable_failure_learning && !outcome.is_timeout && !is_cancellation {
                    if outcome.success {
                        self.memory.record_success(&hit.url).await;
                    } else {
                        let msg = outcome.error.as_deref().unwrap_or("");
                        self.memory
                            .record_failure(&hit.url, FailureType::classify(msg), msg)
                            .await;
                    }
                }

                enhanced.is_timeout = Some(outcome.is_timeout);
                enhanced.fetch_error = outcome.error.clone();

                if outcome.success {
                    enhanced.fetch_success = true;
                    enhanced.fetch_reason = Some("fetched".to_string());
                    enhanced.content = outcome.content;
                    enhanced.content_length = outcome.content_length;
                    enhanced.estimated_tokens = outcome.estimated_tokens;
                    enhanced.is_truncated = Some(outcome.is_truncated);
                    enhanced.extraction_method = outcome.extraction_method;
                    enhanced.is_pdf = Some(outcome.is_pdf);
                    enhanced.metadata = outcome.metadata;
                } else if !hit.snippet.trim().is_empty() {
                    enhanced.fetch_success = true;
                    enhanced.fetch_reason = Some("extraction_failed_snippet_fallback".to_string());
                    enhanced.content =
                        Some(format_snippet_view(&hit.title, &hit.snippet, &hit.url));
                    enhanced.extraction_method = sfe_core::ExtractionMethod::SerpFallbackAfterFailure;
                    enhanced.is_serp_fallback = Some(true);
                } else {
                    enhanced.fetch_success = false;
                    enhanced.extraction_method = outcome.extraction_method;
                    enhanced.is_pdf = Some(outcome.is_pdf);
                }
            }
            Err(e) => {
                debug!(url = %hit.url, error = %e, "extractor call failed");
                enhanced.fetch_success = false;
                enhanced.fetch_error = Some(e.to_string());
            }
        }

        enhanced
    }
}
