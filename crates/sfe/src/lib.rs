//! Public facade crate for `sfe`.
//!
//! Re-exports the backend-agnostic types/traits from `sfe-core` and the orchestration entry
//! point from `sfe-orchestrator`, and wires up the default local backends (`sfe-local`) behind
//! one constructor so callers who don't need custom backends can get a working pipeline from
//! environment variables alone.

pub use sfe_core::*;
pub use sfe_orchestrator::{format_snippet_view, Orchestrator, OrchestratorConfig};

use std::sync::Arc;

/// Build an [`Orchestrator`] wired to the local reqwest-backed SERP client, content extractor
/// and in-process failure memory, all configured from environment variables.
///
/// Requires `SERP_API_KEY` to be set; `HOSTED_CRAWLER_API_KEY` is optional (its absence just
/// drops `HOSTED_CRAWLER` from the content extractor's fallback chain).
pub fn default_orchestrator() -> sfe_core::Result<Orchestrator> {
    let client = sfe_local::build_http_client();
    let serp = sfe_local::SerpProvider::from_env(client.clone())?;
    let extractor = sfe_local::ContentExtractor::new(client);
    let memory = sfe_local::InMemoryFailureMemory::new();
    Ok(Orchestrator::new(
        Arc::new(serp),
        Arc::new(extractor),
        Arc::new(memory),
        OrchestratorConfig::from_env(),
    ))
}
