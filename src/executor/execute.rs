use crate::{
    config::Config,
    executor::{OutputSlot, TaskLayout},
    sync::*,
    task::{ExecApi, Task, TaskSubscriptionId},
    token::CancelToken,
    types::{TaskOutput, TaskResult},
    utils::RangeSplitAtHalf,
};
use core::{
    marker::PhantomData,
    ops::{Deref, Range},
};

/// Everything a worker needs to run tasks of one execution.
///
/// Doubles as the `ExecApi` handed to tasks.
#[cfg(not(feature = "loom"))]
pub(super) struct RunCtx<'a, C: Config> {
    pub(super) tasks: TaskSlots<'a, C>,
    pub(super) outputs: OutputSlots<'a, C>,
    pub(super) parents: ParentInfoSlots<'a>,
    pub(super) tokens: TokenSlots<'a>,
    pub(super) task_ids: TaskIdSlots<'a>,
    pub(super) task_id_to_index: TaskIndexMap<'a>,
    pub(super) cancel: CancelToken,
    pub(super) _marker: PhantomData<&'a ()>,
}

#[cfg(feature = "loom")]
pub(super) struct RunCtx<'a: 'static, C: Config> {
    pub(super) tasks: TaskSlots<'a, C>,
    pub(super) outputs: OutputSlots<'a, C>,
    pub(super) parents: ParentInfoSlots<'a>,
    pub(super) tokens: TokenSlots<'a>,
    pub(super) task_ids: TaskIdSlots<'a>,
    pub(super) task_id_to_index: TaskIndexMap<'a>,
    pub(super) cancel: CancelToken,
    pub(super) _marker: PhantomData<&'a ()>,
}

impl<C: Config> Clone for RunCtx<'_, C> {
    // Plain copies outside of `loom`.
    #[allow(suspicious_double_ref_op)]
    fn clone(&self) -> Self {
        let Self {
            tasks,
            outputs,
            parents,
            tokens,
            task_ids,
            task_id_to_index,
            cancel,
            _marker,
        } = self;
        Self {
            tasks: tasks.clone(),
            outputs: outputs.clone(),
            parents: parents.clone(),
            tokens: tokens.clone(),
            task_ids: task_ids.clone(),
            task_id_to_index: task_id_to_index.clone(),
            cancel: cancel.clone(),
            _marker: PhantomData,
        }
    }
}

impl<C: Config> ExecApi<C> for RunCtx<'_, C> {
    fn read(&self, subscription_id: TaskSubscriptionId) -> &TaskOutput<C> {
        let TaskSubscriptionId(id) = subscription_id;
        let idx = self.task_id_to_index[&id] as usize;
        assert!(
            self.tokens[idx].is_satisfied(),
            "ExecApi::read: task {id} has not published its output"
        );
        // SAFETY: the Acquire load above observed the producer's Release
        // publication, so its write to the slot happened-before this read,
        // and the slot is not written again during this execution.
        match unsafe { read_result::<C>(&self.outputs[idx]) } {
            Some(Ok(output)) => output,
            _ => unreachable!("ExecApi::read: satisfied token without output"),
        }
    }

    fn worker_index(&self) -> usize {
        worker_index()
    }
}

/// # Safety
///
/// No other thread may write `slot` for the lifetime of the returned
/// reference.
pub(super) unsafe fn read_result<C: Config>(slot: &OutputSlot<C>) -> &TaskResult<C> {
    // SAFETY: upheld by the caller.
    unsafe {
        slot.get()
            .with(|ptr| ptr.as_ref().expect("read_result: null slot"))
    }
}

/// # Safety
///
/// - Every slice in `ctx` belongs to the same plan.
/// - `independent_task_range` is in bounds and holds roots only, so each of
///   them may start immediately.
/// - No task index is executed twice in one execution.
pub(super) unsafe fn join_independent_tasks<C: Config>(
    ctx: RunCtx<'_, C>,
    independent_task_range: Range<usize>,
) {
    match independent_task_range.len() {
        0 => return,
        1 => {
            // SAFETY: a root is always ready, and the range is ours alone.
            unsafe { run_task(ctx, independent_task_range.start) };
            return;
        }
        _ => {}
    }

    let (left_range, right_range) = independent_task_range.split_at_half();
    let rhs_ctx = ctx.clone();
    // SAFETY: the halves are disjoint, so no slot is touched by both sides.
    unsafe {
        join(
            move || join_independent_tasks(ctx, left_range),
            move || join_independent_tasks(rhs_ctx, right_range),
        );
    }
}

/// # Safety
///
/// - `idx` is a valid index whose parents have all published.
/// - No other thread runs or reads the task at `idx` concurrently.
unsafe fn run_task<C: Config>(ctx: RunCtx<'_, C>, idx: usize) {
    if ctx.cancel.is_cancelled() {
        tracing::trace!(task_id = ctx.task_ids[idx].get(), "run cancelled, task not dispatched");
        return;
    }
    #[allow(noop_method_call)]
    let tasks = ctx.tasks.clone();
    // SAFETY: upheld by the caller.
    unsafe {
        tasks[idx].get_mut().with(|ptr| {
            ptr.as_mut()
                .expect("run_task: null slot")
                .exec(ctx, idx);
        });
    }
}

impl<C: Config> TaskLayout<C> {
    /// Run the task, publish its result, then run whatever it unblocked.
    ///
    /// # Safety
    ///
    /// - All parents of this task have published before this call.
    /// - `idx` is this task's own slot index in `ctx`.
    unsafe fn exec(&mut self, ctx: RunCtx<'_, C>, idx: usize) {
        let Self {
            task,
            owned_children,
            shared_children,
        } = self;
        let result = task.exec(&ctx);
        let succeeded = result.is_ok();
        if let Err(error) = &result {
            tracing::warn!(
                task_id = ctx.task_ids[idx].get(),
                worker = worker_index(),
                %error,
                "task failed, dependents stay blocked"
            );
        }
        // SAFETY: only this task writes its slot, and nobody reads it before
        // the token below is satisfied.
        unsafe {
            ctx.outputs[idx]
                .get_mut()
                .with(|ptr| *ptr.as_mut().expect("TaskLayout::exec: null slot") = Some(result));
        }
        if !succeeded {
            return;
        }
        ctx.tokens[idx]
            .satisfy()
            .expect("TaskLayout::exec: token satisfied twice");

        let num_owned_tasks = owned_children.len();

        if !shared_children.is_empty() {
            fence(Ordering::Release);
        }
        for &task_index in shared_children.iter() {
            let parent_info = &ctx.parents[task_index as usize];
            if parent_info.parents_left.fetch_sub(1, Ordering::Relaxed) == 1 {
                owned_children.push(task_index);
            }
        }
        if owned_children.len() != num_owned_tasks {
            fence(Ordering::Acquire);
        }

        // SAFETY: every listed child is either owned or had its countdown
        // finished here, behind the Acquire fence above.
        unsafe { join_owned_tasks(ctx, owned_children.as_slice()) };

        owned_children.truncate(num_owned_tasks);
    }
}

/// # Safety
///
/// - `owned_task_indexes` holds valid indexes of tasks that are ready and
///   claimed by the current thread.
/// - Each index appears once.
unsafe fn join_owned_tasks<C: Config>(
    ctx: RunCtx<'_, C>,
    owned_task_indexes: impl Deref<Target = [u32]>,
) {
    match *owned_task_indexes {
        [] => return,
        [task_index] => {
            // SAFETY: upheld by the caller.
            unsafe { run_task(ctx, task_index as usize) };
            return;
        }
        _ => {}
    }
    let (left, right) = owned_task_indexes.split_at(owned_task_indexes.len() / 2);
    #[cfg(feature = "loom")]
    let (left, right) = (
        std::sync::Arc::<[u32]>::from(left),
        std::sync::Arc::<[u32]>::from(right),
    );
    let rhs_ctx = ctx.clone();
    // SAFETY: `left` and `right` are disjoint sets of ready tasks.
    unsafe {
        join(
            move || join_owned_tasks(ctx, left),
            move || join_owned_tasks(rhs_ctx, right),
        );
    }
}
