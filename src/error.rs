use crate::executor::ExecutorSetupError;
use thiserror::Error;

/// Errors that stop a pipeline run before any task executes.
///
/// Stage failures are not errors of the run itself: they are reported in the
/// `RunReport` and only block the affected item.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// Malformed or out-of-range configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Memory for the task graph or the event log could not be reserved.
    #[error("allocation failure for {what} ({requested} entries)")]
    AllocationFailure {
        /// Structure that could not be allocated.
        what: &'static str,
        /// Entries requested.
        requested: usize,
    },
    /// The worker pool could not be started.
    #[error("worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// The task graph was rejected by the executor.
    #[error("task graph: {0}")]
    Setup(#[from] ExecutorSetupError),
}

impl HarnessError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
