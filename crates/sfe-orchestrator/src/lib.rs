mod config;
mod orchestrator;
mod snippet;

pub use config::OrchestratorConfig;
pub use orchestrator::Orchestrator;
pub use snippet::format_snippet_view;
