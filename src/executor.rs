mod execute;
mod setup;

/// Error returned by `Executor::setup` when the provided task graph is invalid.
pub use crate::executor::setup::ExecutorSetupError;
use crate::{
    config::Config,
    executor::{
        execute::{RunCtx, join_independent_tasks, read_result},
        setup::TaskSetupApiImpl,
    },
    sync::AtomicU32,
    task::Task,
    token::{CancelToken, DependencyToken},
    types::{
        HashMap, IndexMap, IndexSet, SyncUnsafeCell, TaskConfig, TaskError, TaskId, TaskOutput,
        TaskResult,
    },
};
use core::{iter, marker::PhantomData};
use derive_more::Debug;
use rustc_hash::FxBuildHasher;
use unzip3::Unzip3;

/// Concurrent DAG executor.
///
/// - `setup` validates the dependency graph, detects cycles and computes a
///   topological plan, mapping every `TaskId` to a slot index.
/// - Children are split into `owned` (single parent) and `shared` (several
///   parents). Owned children run on the parent's worker right after it;
///   shared children are released by an atomic countdown.
/// - `execute` runs the plan on the current rayon pool and blocks until no
///   further task can run.
///
/// Every task owns a [`DependencyToken`] that is satisfied once its output is
/// stored. A failed task leaves its token pending and its dependents unrun.
#[must_use]
#[derive(Debug)]
pub struct Executor<C: Config> {
    tasks: Vec<TaskSlot<C>>,
    outputs: Vec<OutputSlot<C>>,
    parents: Vec<ParentInfoSlot>,
    tokens: Vec<DependencyToken>,
    /// `TaskId` of every slot, in plan order.
    task_ids: Vec<TaskId>,
    num_independent_tasks: u32,
    task_id_to_index: HashMap<TaskId, u32>,
}

pub(crate) type TaskSlot<C> = SyncUnsafeCell<TaskLayout<C>>;

#[must_use]
#[derive(Debug)]
pub(crate) struct TaskLayout<C: Config> {
    task: C::Task,
    /// Children whose only parent is this task. They become runnable the
    /// moment this task publishes, without cross-thread synchronization.
    owned_children: Vec<u32>,
    /// Children that have other parents as well.
    shared_children: Vec<u32>,
}

#[must_use]
#[derive(Debug)]
#[repr(align(128))]
pub(crate) struct ParentInfoSlot {
    parents_total: u32,
    /// Parents that have not published yet in the current execution.
    parents_left: AtomicU32,
}

pub(crate) type OutputSlot<C> = SyncUnsafeCell<TaskResult<C>>;

/// What happened to one task in the last execution.
#[derive(Debug)]
pub enum TaskOutcome<'a, C: Config> {
    /// The task ran and published this output.
    Completed(&'a TaskOutput<C>),
    /// The task ran and failed.
    Failed(&'a TaskError<C>),
    /// The task never ran: a parent failed, the run was cancelled, or the
    /// executor has not been executed yet.
    NotRun,
}

/// Task counts of one execution.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Tasks in the plan.
    pub total: usize,
    /// Tasks that published an output.
    pub completed: usize,
    /// Tasks whose `exec` returned an error.
    pub failed: usize,
    /// Tasks that were never dispatched.
    pub not_run: usize,
}

impl ExecutionSummary {
    /// Whether every task completed.
    pub fn is_success(&self) -> bool {
        self.completed == self.total
    }
}

impl<C: Config> Executor<C> {
    /// Build the execution plan:
    /// - instantiate every task via `Task::setup`, collecting subscriptions,
    /// - order tasks topologically, roots first,
    /// - classify every edge as owned or shared and allocate slots.
    ///
    /// # Panics
    /// In case of internal invariant violations.
    ///
    /// # Errors
    /// If a task subscribes to an unknown task or to itself, if the graph
    /// contains a cycle, or if there are more tasks than `u32` can index.
    pub fn setup(
        task_configs: &IndexMap<TaskId, TaskConfig<C>>,
    ) -> Result<Self, ExecutorSetupError> {
        //   A     B
        //    \   /
        //      C        A->C and B->C are shared edges (C has two parents).
        //      |
        //      D        C->D is owned (D has one parent).
        let total = task_configs.len();
        if u32::try_from(total).is_err() {
            return Err(ExecutorSetupError::TooManyTasks(total));
        }

        // Phase 1: instantiate tasks and record subscriptions in both directions.
        let mut child_to_parents: IndexMap<TaskId, IndexSet<TaskId>> = IndexMap::default();
        let mut parent_to_children: IndexMap<TaskId, IndexSet<TaskId>> = IndexMap::default();
        let mut tasks = IndexMap::with_capacity_and_hasher(total, FxBuildHasher);
        let mut error = None;
        for (&current_task_id, config) in task_configs {
            let mut setup_api = TaskSetupApiImpl::<C> {
                current_task_id,
                task_configs,
                child_to_parents: &mut child_to_parents,
                parent_to_children: &mut parent_to_children,
                error: &mut error,
            };
            let task = Task::setup(&mut setup_api, config);
            tasks.insert(current_task_id, task);
        }
        if let Some(error) = error {
            return Err(error);
        }

        // Phase 2: Kahn's algorithm. Roots keep their config order and come first.
        let mut parents_pending: HashMap<TaskId, usize> = child_to_parents
            .iter()
            .map(|(&child, parents)| (child, parents.len()))
            .collect();
        let mut order: IndexSet<TaskId> = tasks
            .keys()
            .filter(|id| !child_to_parents.contains_key(*id))
            .copied()
            .collect();
        let num_independent_tasks = order.len();
        let mut cursor = 0;
        while let Some(&task_id) = order.get_index(cursor) {
            cursor += 1;
            let Some(children) = parent_to_children.get(&task_id) else {
                continue;
            };
            for &child in children {
                let pending = parents_pending
                    .get_mut(&child)
                    .expect("Executor::setup: [1]");
                *pending -= 1;
                if *pending == 0 {
                    let inserted = order.insert(child);
                    assert!(inserted, "Executor::setup: [2]");
                }
            }
        }
        if order.len() != tasks.len() {
            // Whatever is left waits on itself through some path.
            return Err(ExecutorSetupError::Cycle);
        }

        let task_id_to_index: HashMap<TaskId, u32> = order
            .iter()
            .enumerate()
            .map(|(idx, &id)| (id, idx.try_into().expect("Executor::setup: [3]")))
            .collect();

        // Phase 3: materialize slots in plan order and classify child edges.
        let (task_slots, parent_slots, task_ids): (Vec<_>, Vec<_>, Vec<_>) = order
            .iter()
            .map(|&task_id| {
                let parents_total = child_to_parents
                    .get(&task_id)
                    .map_or(0, IndexSet::len)
                    .try_into()
                    .expect("Executor::setup: [4]");
                let mut owned_children = vec![];
                let mut shared_children = vec![];
                for child in parent_to_children.get(&task_id).into_iter().flatten() {
                    let child_idx = task_id_to_index[child];
                    if child_to_parents[child].len() == 1 {
                        owned_children.push(child_idx);
                    } else {
                        shared_children.push(child_idx);
                    }
                }
                // Sorted for cache locality.
                owned_children.sort_unstable();
                shared_children.sort_unstable();
                let task_slot = TaskSlot::new(TaskLayout {
                    task: tasks.swap_remove(&task_id).expect("Executor::setup: [5]"),
                    owned_children,
                    shared_children,
                });
                let parent_slot = ParentInfoSlot {
                    parents_total,
                    parents_left: AtomicU32::new(parents_total),
                };
                (task_slot, parent_slot, task_id)
            })
            .unzip3();
        assert!(tasks.is_empty(), "Executor::setup: [6]");

        let len = task_slots.len();
        let result = Self {
            tasks: task_slots,
            outputs: iter::repeat_with(|| OutputSlot::<C>::new(None))
                .take(len)
                .collect(),
            parents: parent_slots,
            tokens: iter::repeat_with(DependencyToken::new).take(len).collect(),
            task_ids,
            num_independent_tasks: num_independent_tasks
                .try_into()
                .expect("Executor::setup: [7]"),
            task_id_to_index,
        };
        if !result.tasks.is_empty() {
            assert_ne!(result.num_independent_tasks, 0, "Executor::setup: [8]");
        }
        tracing::debug!(
            tasks = len,
            roots = num_independent_tasks,
            edges = child_to_parents.values().map(IndexSet::len).sum::<usize>(),
            "execution plan built"
        );
        Ok(result)
    }

    /// Execute every task in dependency order on the current rayon pool.
    ///
    /// Blocks until all runnable tasks finished. Wrap the call in
    /// `ThreadPool::install` to bound the number of workers.
    pub fn execute(&mut self) -> ExecutionSummary {
        self.execute_with(&CancelToken::new())
    }

    /// Like [`Executor::execute`], but stops dispatching new tasks once
    /// `cancel` is triggered. Tasks already running finish.
    ///
    /// Roots are split recursively across workers. A finishing task:
    /// - stores its output and satisfies its token (Release),
    /// - issues a Release fence if it has shared children and decrements
    ///   their `parents_left` (Relaxed),
    /// - runs its owned children plus every shared child whose counter it
    ///   brought to zero, after an Acquire fence.
    #[cfg(not(feature = "loom"))]
    pub fn execute_with(&mut self, cancel: &CancelToken) -> ExecutionSummary {
        self.reset();
        let Self {
            tasks,
            outputs,
            parents,
            tokens,
            task_ids,
            num_independent_tasks,
            task_id_to_index,
        } = &*self;
        let ctx = RunCtx {
            tasks,
            outputs,
            parents,
            tokens,
            task_ids,
            task_id_to_index,
            cancel: cancel.clone(),
            _marker: PhantomData,
        };
        // SAFETY: slices come from `self` and describe one plan; the first
        // `num_independent_tasks` slots are roots and may start immediately.
        unsafe {
            join_independent_tasks(ctx, 0..*num_independent_tasks as usize);
        }
        self.finish()
    }

    /// Loom-testable version of `execute_with`.
    #[cfg(feature = "loom")]
    pub fn execute_with(&mut self, cancel: &CancelToken) -> ExecutionSummary {
        use std::sync::Arc;

        self.reset();
        let Self {
            tasks,
            outputs,
            parents,
            tokens,
            task_ids,
            num_independent_tasks,
            task_id_to_index,
        } = core::mem::replace(self, Self::empty());

        let tasks = Arc::new(tasks);
        let outputs = Arc::new(outputs);
        let parents = Arc::new(parents);
        let tokens = Arc::new(tokens);
        let task_ids = Arc::new(task_ids);
        let task_id_to_index = Arc::new(task_id_to_index);

        let ctx = RunCtx {
            tasks: tasks.clone(),
            outputs: outputs.clone(),
            parents: parents.clone(),
            tokens: tokens.clone(),
            task_ids: task_ids.clone(),
            task_id_to_index: task_id_to_index.clone(),
            cancel: cancel.clone(),
            _marker: PhantomData,
        };
        // SAFETY: the `Arc`-backed slices describe one plan; the first
        // `num_independent_tasks` slots are roots.
        unsafe {
            join_independent_tasks(ctx, 0..num_independent_tasks as usize);
        }

        *self = Self {
            tasks: Arc::into_inner(tasks).unwrap(),
            outputs: Arc::into_inner(outputs).unwrap(),
            parents: Arc::into_inner(parents).unwrap(),
            tokens: Arc::into_inner(tokens).unwrap(),
            task_ids: Arc::into_inner(task_ids).unwrap(),
            num_independent_tasks,
            task_id_to_index: Arc::into_inner(task_id_to_index).unwrap(),
        };
        self.finish()
    }

    #[cfg(feature = "loom")]
    fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            outputs: Vec::new(),
            parents: Vec::new(),
            tokens: Vec::new(),
            task_ids: Vec::new(),
            num_independent_tasks: 0,
            task_id_to_index: HashMap::default(),
        }
    }

    /// Fresh outputs, tokens and countdowns for the next execution.
    fn reset(&mut self) {
        for output in &mut self.outputs {
            *output = OutputSlot::<C>::new(None);
        }
        for token in &mut self.tokens {
            *token = DependencyToken::new();
        }
        for parent in &mut self.parents {
            parent.parents_left = AtomicU32::new(parent.parents_total);
        }
    }

    fn finish(&self) -> ExecutionSummary {
        let summary = self.summary();
        tracing::debug!(
            completed = summary.completed,
            failed = summary.failed,
            not_run = summary.not_run,
            "execution finished"
        );
        summary
    }

    /// Task counts of the last execution.
    pub fn summary(&self) -> ExecutionSummary {
        let mut summary = ExecutionSummary {
            total: self.outputs.len(),
            ..ExecutionSummary::default()
        };
        for slot in &self.outputs {
            // SAFETY: `&self` excludes a concurrent execution.
            match unsafe { read_result::<C>(slot) } {
                Some(Ok(_)) => summary.completed += 1,
                Some(Err(_)) => summary.failed += 1,
                None => summary.not_run += 1,
            }
        }
        summary
    }

    /// Outcome of `task_id` in the last execution, `None` for unknown ids.
    pub fn outcome(&self, task_id: TaskId) -> Option<TaskOutcome<'_, C>> {
        let idx = *self.task_id_to_index.get(&task_id)? as usize;
        // SAFETY: `&self` excludes a concurrent execution.
        let outcome = match unsafe { read_result::<C>(&self.outputs[idx]) } {
            Some(Ok(output)) => TaskOutcome::Completed(output),
            Some(Err(error)) => TaskOutcome::Failed(error),
            None => TaskOutcome::NotRun,
        };
        Some(outcome)
    }

    /// Completion token of `task_id`, `None` for unknown ids.
    pub fn token(&self, task_id: TaskId) -> Option<&DependencyToken> {
        let idx = *self.task_id_to_index.get(&task_id)? as usize;
        Some(&self.tokens[idx])
    }

    /// Task ids in plan order: roots first, every task after its parents.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    /// Number of tasks in the plan.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the plan has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
