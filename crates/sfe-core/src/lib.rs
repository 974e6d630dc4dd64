mod error;
mod extract;
mod memory;
mod request;
mod response;
mod serp;

pub use error::{Error, Result};
pub use extract::{ExtractOptions, ExtractionMethod, Extractor, FailureType, FetchOutcome};
pub use memory::{FailureMemory, FailureRecord, SkipDecision};
pub use request::{Mode, ParsedQueries, SearchRequest};
pub use response::{EnhancedResult, QueryDetail, SearchResponse, SearchType, Statistics};
pub use serp::{SerpClient, SerpOptions, SerpResult};

/// Re-exported so downstream crates can accept `&CancellationToken` without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
