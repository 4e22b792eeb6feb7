use crate::{
    config::Config,
    task::{SetupApi, TaskSubscriptionId},
    types::{IndexMap, IndexSet, TaskConfig, TaskId},
};
use thiserror::Error;

/// Error returned by `Executor::setup` when the task graph is invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExecutorSetupError {
    /// The dependency graph contains cycle(s).
    #[error("graph contains cycle(s)")]
    Cycle,
    /// A task subscribed to a task that has no config.
    #[error("task {child} subscribes to unknown task {parent}")]
    UnknownParent {
        /// Subscribing task.
        child: TaskId,
        /// Missing parent.
        parent: TaskId,
    },
    /// A task subscribed to itself.
    #[error("task {0} subscribes to itself")]
    SelfDependency(TaskId),
    /// More tasks than the executor can index.
    #[error("too many tasks: {0}")]
    TooManyTasks(usize),
}

pub(super) struct TaskSetupApiImpl<'a, C: Config> {
    pub(super) current_task_id: TaskId,
    pub(super) task_configs: &'a IndexMap<TaskId, TaskConfig<C>>,
    pub(super) child_to_parents: &'a mut IndexMap<TaskId, IndexSet<TaskId>>,
    pub(super) parent_to_children: &'a mut IndexMap<TaskId, IndexSet<TaskId>>,
    /// First invalid subscription seen; setup bails out with it.
    pub(super) error: &'a mut Option<ExecutorSetupError>,
}

impl<C: Config> SetupApi for TaskSetupApiImpl<'_, C> {
    fn subscribe(&mut self, parent_task_id: TaskId) -> TaskSubscriptionId {
        let Self {
            current_task_id,
            task_configs,
            child_to_parents,
            parent_to_children,
            error,
        } = self;
        let child = *current_task_id;
        if !task_configs.contains_key(&parent_task_id) {
            error.get_or_insert(ExecutorSetupError::UnknownParent {
                child,
                parent: parent_task_id,
            });
        } else if child == parent_task_id {
            error.get_or_insert(ExecutorSetupError::SelfDependency(child));
        } else {
            child_to_parents
                .entry(child)
                .or_default()
                .insert(parent_task_id);
            parent_to_children
                .entry(parent_task_id)
                .or_default()
                .insert(child);
        }
        TaskSubscriptionId(parent_task_id)
    }
}
