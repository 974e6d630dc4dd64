//! Smart-skip failure memory: process-wide, per-host extraction outcome tracking.
//!
//! Keyed by host (URL-level records aggregate up). Thread-safe via `DashMap`'s internal
//! sharded locking — per-host updates don't contend with other hosts.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

use sfe_core::{FailureMemory, FailureRecord, FailureType, SkipDecision};

const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;
const DEFAULT_RETENTION_DAYS: u64 = 30;
const MIN_FAILURES: u32 = 3;

#[derive(Debug, Clone)]
struct HostState {
    failure_count: u32,
    success_count: u32,
    last_failure_type: Option<FailureType>,
    last_seen_at_epoch_s: u64,
}

impl HostState {
    fn new() -> Self {
        Self {
            failure_count: 0,
            success_count: 0,
            last_failure_type: None,
            last_seen_at_epoch_s: now_epoch_s(),
        }
    }
}

fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// In-process smart-skip memory. Persistence is intentionally out of scope — the trait
/// boundary in `sfe-core` is what a durable implementation would sit behind.
pub struct InMemoryFailureMemory {
    hosts: DashMap<String, HostState>,
    confidence_threshold: f64,
    retention: Duration,
    purges: AtomicU64,
}

impl InMemoryFailureMemory {
    pub fn new() -> Self {
        Self::with_threshold(confidence_threshold_from_env())
    }

    pub fn with_threshold(confidence_threshold: f64) -> Self {
        Self {
            hosts: DashMap::new(),
            confidence_threshold,
            retention: Duration::from_secs(DEFAULT_RETENTION_DAYS * 24 * 3600),
            purges: AtomicU64::new(0),
        }
    }

    /// Drop per-host state last observed more than `retention` in the past. Coarser-grained
    /// than per-host record updates (iterates the whole map), matching the spec's split between
    /// per-host locks and a global maintenance lock.
    pub fn purge_expired(&self) -> usize {
        let cutoff = now_epoch_s().saturating_sub(self.retention.as_secs());
        let before = self.hosts.len();
        self.hosts.retain(|_, state| state.last_seen_at_epoch_s >= cutoff);
        self.purges.fetch_add(1, Ordering::Relaxed);
        before - self.hosts.len()
    }

    pub fn dump(&self) -> Vec<FailureRecord> {
        self.hosts
            .iter()
            .map(|entry| FailureRecord {
                host: entry.key().clone(),
                failure_count: entry.failure_count,
                success_count: entry.success_count,
                last_failure_type: entry.last_failure_type,
                last_seen_at_epoch_s: entry.last_seen_at_epoch_s,
            })
            .collect()
    }
}

impl Default for InMemoryFailureMemory {
    fn default() -> Self {
        Self::new()
    }
}

fn confidence_threshold_from_env() -> f64 {
    std::env::var("SFE_CONFIDENCE_THRESHOLD")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD)
}

fn decide(state: &HostState, confidence_threshold: f64, retention: Duration) -> SkipDecision {
    let total = state.failure_count + state.success_count + 1;
    let confidence = state.failure_count as f64 / total as f64;

    let within_window =
        now_epoch_s().saturating_sub(state.last_seen_at_epoch_s) <= retention.as_secs();

    let should_skip =
        confidence >= confidence_threshold && state.failure_count >= MIN_FAILURES && within_window;

    SkipDecision {
        should_skip,
        reason: if should_skip {
            format!(
                "host has {} prior failures ({:.0}% failure rate)",
                state.failure_count,
                confidence * 100.0
            )
        } else {
            String::new()
        },
        confidence,
    }
}

#[async_trait::async_trait]
impl FailureMemory for InMemoryFailureMemory {
    async fn should_skip(&self, url: &str) -> SkipDecision {
        let host = host_of(url);
        match self.hosts.get(&host) {
            Some(state) => decide(&state, self.confidence_threshold, self.retention),
            None => SkipDecision::no(),
        }
    }

    async fn record_success(&self, url: &str) {
        let host = host_of(url);
        let mut entry = self.hosts.entry(host).or_insert_with(HostState::new);
        entry.success_count += 1;
        entry.last_seen_at_epoch_s = now_epoch_s();
        // Successes partially rehabilitate a host: decrement the weight of the oldest failure.
        if entry.failure_count > 0 {
            entry.failure_count -= 1;
        }
    }

    async fn record_failure(&self, url: &str, kind: FailureType, _message: &str) {
        let host = host_of(url);
        let mut entry = self.hosts.entry(host).or_insert_with(HostState::new);
        entry.failure_count += 1;
        entry.last_failure_type = Some(kind);
        entry.last_seen_at_epoch_s = now_epoch_s();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_host_is_never_skipped() {
        let mem = InMemoryFailureMemory::with_threshold(0.7);
        let d = mem.should_skip("https://example.com/a").await;
        assert!(!d.should_skip);
        assert_eq!(d.confidence, 0.0);
    }

    #[tokio::test]
    async fn converges_to_skip_after_consecutive_failures() {
        let mem = InMemoryFailureMemory::with_threshold(0.7);
        for _ in 0..3 {
            mem.record_failure("https://flaky.example/page", FailureType::Http403, "403")
                .await;
        }
        let d = mem.should_skip("https://flaky.example/other-page").await;
        assert!(d.should_skip);
        assert!(d.confidence >= 0.7);
    }

    #[tokio::test]
    async fn two_failures_alone_do_not_trigger_skip() {
        let mem = InMemoryFailureMemory::with_threshold(0.7);
        for _ in 0..2 {
            mem.record_failure("https://flaky.example/page", FailureType::Http403, "403")
                .await;
        }
        let d = mem.should_skip("https://flaky.example/page").await;
        assert!(!d.should_skip);
    }

    #[tokio::test]
    async fn success_rehabilitates_a_failing_host() {
        let mem = InMemoryFailureMemory::with_threshold(0.7);
        for _ in 0..5 {
            mem.record_failure("https://flaky.example/page", FailureType::Timeout, "timeout")
                .await;
        }
        assert!(mem.should_skip("https://flaky.example/page").await.should_skip);
        for _ in 0..5 {
            mem.record_success("https://flaky.example/page").await;
        }
        assert!(!mem.should_skip("https://flaky.example/page").await.should_skip);
    }

    #[tokio::test]
    async fn aggregates_by_host_not_by_full_url() {
        let mem = InMemoryFailureMemory::with_threshold(0.7);
        for path in ["/a", "/b", "/c"] {
            mem.record_failure(
                &format!("https://flaky.example{path}"),
                FailureType::Http403,
                "403",
            )
            .await;
        }
        assert!(mem.should_skip("https://flaky.example/d").await.should_skip);
    }

    #[test]
    fn purge_expired_drops_stale_hosts() {
        let mem = InMemoryFailureMemory::with_threshold(0.7);
        mem.hosts.insert(
            "old.example".to_string(),
            HostState {
                failure_count: 5,
                success_count: 0,
                last_failure_type: Some(FailureType::Timeout),
                last_seen_at_epoch_s: 0,
            },
        );
        let removed = mem.purge_expired();
        assert_eq!(removed, 1);
        assert!(mem.hosts.is_empty());
    }
}
