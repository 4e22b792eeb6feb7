use crate::task::Task;

/// Binds a concrete task type to the executor.
///
/// The task's associated types (`Config`, `Output`, `Error`) then define what
/// the executor is built from, what it publishes between tasks, and how a
/// task reports failure.
pub trait Config: Sized + 'static {
    /// The task type the executor constructs and runs.
    type Task: Task<Self>;
}
