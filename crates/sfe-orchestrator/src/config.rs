use std::time::Duration;

/// Concurrency gates, timeout hierarchy and content caps, resolved from the environment at
/// construction time so a single process can run with fixed budgets for its lifetime.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_queries: usize,
    pub max_concurrent_fetch: usize,
    pub query_timeout_light: Duration,
    pub query_timeout_full: Duration,
    pub single_url_timeout: Duration,
    pub parallel_fetch_timeout: Duration,
    pub auto_fetch_limit: usize,
    pub max_content_bytes: usize,
    pub max_content_tokens: usize,
    pub enable_failure_learning: bool,
    pub confidence_threshold: f64,
    pub debug: bool,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrent_queries: env_usize("SFE_MAX_CONCURRENT_QUERIES", 3),
            max_concurrent_fetch: env_usize("SFE_MAX_CONCURRENT_FETCH", 3),
            query_timeout_light: Duration::from_secs(env_u64("SFE_QUERY_TIMEOUT_LIGHT_SECONDS", 60)),
            query_timeout_full: Duration::from_secs(env_u64("SFE_QUERY_TIMEOUT_FULL_SECONDS", 120)),
            single_url_timeout: Duration::from_secs(env_u64(
                "SFE_SINGLE_URL_TIMEOUT_SECONDS",
                15,
            )),
            parallel_fetch_timeout: Duration::from_secs(env_u64(
                "SFE_PARALLEL_FETCH_TIMEOUT_SECONDS",
                30,
            )),
            auto_fetch_limit: env_usize("SFE_AUTO_FETCH_LIMIT", 3),
            max_content_bytes: env_usize("SFE_MAX_CONTENT_BYTES", 10_000),
            max_content_tokens: env_usize("SFE_MAX_CONTENT_TOKENS", 3_000),
            enable_failure_learning: env_bool("SFE_ENABLE_FAILURE_LEARNING", true),
            confidence_threshold: env_f64("SFE_CONFIDENCE_THRESHOLD", 0.7),
            debug: env_bool("SFE_DEBUG", false),
        }
    }

    pub fn query_timeout(&self, mode: sfe_core::Mode) -> Duration {
        match mode {
            sfe_core::Mode::Light => self.query_timeout_light,
            sfe_core::Mode::Full => self.query_timeout_full,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("0") | Some("false") | Some("no") => false,
        Some("1") | Some("true") | Some("yes") => true,
        _ => default,
    }
}
