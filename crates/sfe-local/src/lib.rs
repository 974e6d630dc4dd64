pub mod content_extractor;
pub mod extract_html;
pub mod hosted_crawler;
pub mod memory;
pub mod pdf;
pub mod query_parser;
pub mod serp;

pub use content_extractor::ContentExtractor;
pub use memory::InMemoryFailureMemory;
pub use serp::SerpProvider;

const MAX_CONNECTIONS_PER_HOST: usize = 10;

/// A `reqwest::Client` configured the way every strategy in this crate expects: rustls TLS,
/// HTTP/2, and a bounded per-host connection pool, per the shared-resources section of the
/// spec this crate implements. DNS resolution is left to `reqwest`'s default (hickory-style)
/// resolver, which already caches negative and positive lookups.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(MAX_CONNECTIONS_PER_HOST)
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build()
        .unwrap_or_default()
}
