use crate::{
    config::Config,
    types::{TaskId, TaskOutput},
};
use core::fmt::Debug;

/// A single unit of computation in the DAG.
///
/// Tasks are constructed once during `Executor::setup` via `Task::setup`,
/// where they declare their parents through the `SetupApi`. `exec` runs once
/// per execution, after every parent completed successfully; parents'
/// outputs are read through the `ExecApi`.
///
/// A task that returns `Err` keeps its children from ever running in that
/// execution. Tasks unrelated to it are not affected.
pub trait Task<C: Config>: Debug + Send + Sync {
    /// Task configuration type.
    type Config;
    /// Task output type.
    type Output: Send + Sync;
    /// Task failure type.
    type Error: std::error::Error + Send + Sync + 'static;
    /// Construct the task from a user-provided config, subscribing to parents
    /// via `api.subscribe(parent_id)`.
    fn setup(api: &mut impl SetupApi, config: &Self::Config) -> Self;
    /// Execute the task.
    ///
    /// # Errors
    /// Whatever the task considers a failure of its own work.
    fn exec(&mut self, data: &impl ExecApi<C>) -> Result<Self::Output, Self::Error>;
}

/// API available to tasks during construction to declare dependencies.
pub trait SetupApi {
    /// Subscribe to a parent task by its `TaskId`.
    ///
    /// Subscribing to an unknown task or to the task itself makes
    /// `Executor::setup` fail.
    fn subscribe(&mut self, parent_task_id: TaskId) -> TaskSubscriptionId;
}

/// API available to tasks at execution time.
pub trait ExecApi<C: Config> {
    /// Read the output of a parent previously subscribed to via `SetupApi`.
    ///
    /// # Panics
    /// If the parent's dependency token is not satisfied, which the executor
    /// never allows to happen.
    fn read(&self, subscription_id: TaskSubscriptionId) -> &TaskOutput<C>;
    /// Index of the pool worker executing the current task.
    fn worker_index(&self) -> usize;
}

/// Opaque handle representing a subscription to a parent task's output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TaskSubscriptionId(pub(crate) TaskId);
