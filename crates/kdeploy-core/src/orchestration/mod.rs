//! Top-level dispatch of an App's deploy, delete, inspect and metadata
//! requests to its deploy method.

mod cancel_watch;
mod host;
mod orchestrator;

pub use cancel_watch::CancelCondition;
pub use host::AppHost;
pub use orchestrator::AppOrchestrator;
