use crate::{
    error::HarnessError,
    executor::{Executor, TaskOutcome},
    pipeline::{
        graph::{PipelineConfig, build_task_graph},
        options::PipelineOptions,
        recorder::EventRecorder,
        report::{ItemResult, RunReport, StageOutcome},
        stage::{ItemId, PipelineStages, Stage, SyntheticStages, TaskKey},
    },
    token::CancelToken,
};
use std::sync::Arc;

/// Runs the Produce→Transform→Consume pipeline for `N` items on a bounded
/// worker pool and reports what happened.
#[derive(Debug)]
pub struct Harness<S = SyntheticStages> {
    options: PipelineOptions,
    stages: Arc<S>,
    cancel: CancelToken,
}

impl Harness<SyntheticStages> {
    /// Harness with the synthetic stage bodies, costed by `options`.
    pub fn new(options: PipelineOptions) -> Self {
        let stages = SyntheticStages::new(options.costs, options.cost_unit);
        Self::with_stages(options, stages)
    }
}

impl<S: PipelineStages> Harness<S> {
    /// Harness with custom stage bodies. Cost options are ignored.
    pub fn with_stages(options: PipelineOptions, stages: S) -> Self {
        Self {
            options,
            stages: Arc::new(stages),
            cancel: CancelToken::new(),
        }
    }

    /// Options of the run.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Token stopping further dispatch of an ongoing [`Harness::run`].
    ///
    /// Cancellation is permanent: every later `run` of this harness
    /// dispatches nothing and reports all stages as blocked.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run the pipeline once.
    ///
    /// Stage failures do not make this fail: they show up in the report,
    /// see [`RunReport::is_success`].
    ///
    /// # Errors
    /// Before any stage runs:
    /// - [`HarnessError::InvalidArgument`] for bad options,
    /// - [`HarnessError::AllocationFailure`] if the graph or the event log
    ///   cannot be allocated,
    /// - [`HarnessError::ThreadPool`] if the workers cannot be spawned.
    pub fn run(&self) -> Result<RunReport, HarnessError> {
        self.options.validate()?;
        let workers = self.options.workers.resolve().get();
        let span = tracing::info_span!("pipeline", items = self.options.items, workers);
        let _entered = span.enter();
        if self.cancel.is_cancelled() {
            tracing::warn!("harness already cancelled, no stage will run");
        }

        let recorder = Arc::new(EventRecorder::with_capacity(self.options.total_tasks())?);
        let graph = build_task_graph(self.options.items, &self.stages, &recorder)?;
        let mut executor = Executor::<PipelineConfig<S>>::setup(&graph)?;
        drop(graph);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("pipeline-worker-{idx}"))
            .build()?;

        tracing::info!(tasks = executor.len(), "pipeline run started");
        let started = recorder.start_clock();
        let summary = pool.install(|| executor.execute_with(&self.cancel));
        let elapsed = started.elapsed();
        tracing::info!(
            elapsed = ?elapsed,
            completed = summary.completed,
            failed = summary.failed,
            not_run = summary.not_run,
            "pipeline run finished"
        );

        let items = (0..self.options.items)
            .map(|item| item_result(&executor, item))
            .collect();
        Ok(RunReport::new(
            workers,
            elapsed,
            recorder.take_sorted(),
            items,
            summary,
            self.options.verbosity,
        ))
    }
}

fn item_result<S: PipelineStages>(
    executor: &Executor<PipelineConfig<S>>,
    item: ItemId,
) -> ItemResult {
    let outcome = |stage| {
        let task_id = TaskKey { item, stage }
            .task_id()
            .expect("item_result: [1]");
        match executor.outcome(task_id) {
            Some(TaskOutcome::Completed(value)) => StageOutcome::Completed(*value),
            Some(TaskOutcome::Failed(error)) => StageOutcome::Failed(error.reason.clone()),
            Some(TaskOutcome::NotRun) | None => StageOutcome::Blocked,
        }
    };
    ItemResult {
        item,
        produce: outcome(Stage::Produce),
        transform: outcome(Stage::Transform),
        consume: outcome(Stage::Consume),
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::pipeline::{options::WorkerCount, stage::StageCosts};
    use core::num::NonZeroUsize;

    fn options(items: u32, workers: usize) -> PipelineOptions {
        PipelineOptions::new(items)
            .with_workers(WorkerCount::Fixed(NonZeroUsize::new(workers).unwrap()))
            .with_costs(StageCosts::default(), 100)
    }

    #[test]
    fn run_reports_every_item() {
        let report = Harness::new(options(3, 2)).run().unwrap();
        assert!(report.is_success());
        assert_eq!(report.workers(), 2);
        assert_eq!(report.events().len(), 9);
        let consumed: Vec<_> = report.items().iter().map(ItemResult::consumed).collect();
        assert_eq!(consumed, [Some(0), Some(2), Some(4)]);
    }

    #[test]
    fn cancelled_harness_runs_nothing() {
        let harness = Harness::new(options(2, 1));
        harness.cancel_token().cancel();
        let report = harness.run().unwrap();
        assert!(report.events().is_empty());
        assert_eq!(report.summary().not_run, 6);
        assert!(report.items().iter().all(|item| item.produce == StageOutcome::Blocked));

        let again = harness.run().unwrap();
        assert!(again.events().is_empty());
        assert!(!again.is_success());
    }
}
