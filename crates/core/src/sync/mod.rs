mod sync_log_model;
mod sync_orchestrator;
mod sync_progress;
mod sync_run_model;
mod sync_tasks;

pub use sync_log_model::*;
pub use sync_orchestrator::SyncOrchestrator;
pub use sync_progress::{publish_skipped, RunContext};
pub use sync_run_model::*;
pub use sync_tasks::TaskRegistry;
