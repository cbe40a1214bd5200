mod results;
mod summary;
mod task;

pub use results::{RunResultSet, StatusCounts, UpdateError};
pub use summary::{now_utc_iso, write_summary, RunSummary, TaskSummary};
pub use task::{GenerationTask, TaskStatus, TransitionRefused};
