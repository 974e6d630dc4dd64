use crate::FailureType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipDecision {
    pub should_skip: bool,
    pub reason: String,
    pub confidence: f64,
}

impl SkipDecision {
    pub fn no() -> Self {
        Self {
            should_skip: false,
            reason: String::new(),
            confidence: 0.0,
        }
    }
}

/// Historical extraction outcome for one host, as surfaced by `FailureMemory::dump`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub host: String,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_type: Option<FailureType>,
    pub last_seen_at_epoch_s: u64,
}

#[async_trait::async_trait]
pub trait FailureMemory: Send + Sync {
    async fn should_skip(&self, url: &str) -> SkipDecision;
    async fn record_success(&self, url: &str);
    async fn record_failure(&self, url: &str, kind: FailureType, message: &str);
}
