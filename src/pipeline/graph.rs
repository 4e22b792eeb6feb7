use crate::{
    config::Config,
    error::HarnessError,
    pipeline::{
        options::MAX_ITEMS,
        recorder::{EventRecorder, ExecutionEvent},
        stage::{ItemId, PipelineStages, Stage, StageError, TaskKey},
    },
    task::{ExecApi, SetupApi, Task, TaskSubscriptionId},
    types::{IndexMap, TaskId},
};
use core::marker::PhantomData;
use std::sync::Arc;

/// Binds [`StageTask`] to the executor for stage bodies `S`.
#[derive(Debug)]
pub struct PipelineConfig<S>(PhantomData<fn() -> S>);

impl<S: PipelineStages> Config for PipelineConfig<S> {
    type Task = StageTask<S>;
}

/// Everything needed to build one [`StageTask`].
#[derive(Debug)]
pub struct StageTaskConfig<S> {
    key: TaskKey,
    upstream: Option<TaskId>,
    stages: Arc<S>,
    recorder: Arc<EventRecorder>,
}

impl<S> StageTaskConfig<S> {
    /// Item and stage of the task.
    pub fn key(&self) -> TaskKey {
        self.key
    }

    /// Task whose output this one reads, `None` for Produce.
    pub fn upstream(&self) -> Option<TaskId> {
        self.upstream
    }
}

/// One stage of one item, as scheduled by the executor.
///
/// Wraps the stage body with instrumentation: the body's execution window
/// and worker are recorded as an [`ExecutionEvent`], whether it succeeds or
/// not. Consume publishes the value it observed.
#[derive(Debug)]
pub struct StageTask<S> {
    key: TaskKey,
    upstream: Option<TaskSubscriptionId>,
    stages: Arc<S>,
    recorder: Arc<EventRecorder>,
}

impl<S: PipelineStages> Task<PipelineConfig<S>> for StageTask<S> {
    type Config = StageTaskConfig<S>;
    type Output = u64;
    type Error = StageError;

    fn setup(api: &mut impl SetupApi, config: &Self::Config) -> Self {
        Self {
            key: config.key,
            upstream: config.upstream.map(|parent| api.subscribe(parent)),
            stages: Arc::clone(&config.stages),
            recorder: Arc::clone(&config.recorder),
        }
    }

    fn exec(&mut self, data: &impl ExecApi<PipelineConfig<S>>) -> Result<u64, StageError> {
        let Self {
            key,
            upstream,
            stages,
            recorder,
        } = &*self;
        let TaskKey { item, stage } = *key;
        let input = upstream.map(|subscription| *data.read(subscription));
        let worker = data.worker_index();

        let start = recorder.elapsed();
        let result = match (stage, input) {
            (Stage::Produce, _) => stages.produce(item),
            (Stage::Transform, Some(produced)) => stages.transform(item, produced),
            (Stage::Consume, Some(transformed)) => {
                stages.consume(item, transformed).map(|()| transformed)
            }
            (_, None) => Err(StageError::new(item, stage, "missing upstream output")),
        };
        let end = recorder.elapsed();

        recorder
            .record(ExecutionEvent {
                item,
                stage,
                worker,
                start,
                end,
                succeeded: result.is_ok(),
            })
            .map_err(|error| StageError::new(item, stage, error.to_string()))?;
        result
    }
}

/// Build the `3 × items` task configs of a run.
///
/// Produce of item `i` has no parent, Transform depends on Produce and
/// Consume on Transform of the same item. Items share no edges.
///
/// # Errors
/// - [`HarnessError::InvalidArgument`] if `items` is zero or above
///   [`MAX_ITEMS`].
/// - [`HarnessError::AllocationFailure`] if the graph cannot be allocated.
pub fn build_task_graph<S: PipelineStages>(
    items: ItemId,
    stages: &Arc<S>,
    recorder: &Arc<EventRecorder>,
) -> Result<IndexMap<TaskId, StageTaskConfig<S>>, HarnessError> {
    if items == 0 {
        return Err(HarnessError::invalid("items must be > 0"));
    }
    if items > MAX_ITEMS {
        return Err(HarnessError::invalid(format!(
            "items must be <= {MAX_ITEMS}, got {items}"
        )));
    }
    let total = items as usize * Stage::ALL.len();
    let mut graph = IndexMap::default();
    graph
        .try_reserve(total)
        .map_err(|_| HarnessError::AllocationFailure {
            what: "task graph",
            requested: total,
        })?;
    for item in 0..items {
        let mut upstream = None;
        for stage in Stage::ALL {
            let key = TaskKey { item, stage };
            let task_id = key.task_id().expect("build_task_graph: [1]");
            graph.insert(
                task_id,
                StageTaskConfig {
                    key,
                    upstream,
                    stages: Arc::clone(stages),
                    recorder: Arc::clone(recorder),
                },
            );
            upstream = Some(task_id);
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::SyntheticStages;

    fn fixtures() -> (Arc<SyntheticStages>, Arc<EventRecorder>) {
        (
            Arc::new(SyntheticStages::default()),
            Arc::new(EventRecorder::with_capacity(0).unwrap()),
        )
    }

    #[test]
    fn chains_stages_per_item() {
        let (stages, recorder) = fixtures();
        let graph = build_task_graph(4, &stages, &recorder).unwrap();
        assert_eq!(graph.len(), 12);
        for (&task_id, config) in &graph {
            let key = config.key();
            assert_eq!(TaskKey::from_task_id(task_id), key);
            let expected_upstream = key
                .stage
                .upstream()
                .map(|stage| TaskKey { item: key.item, stage }.task_id().unwrap());
            assert_eq!(config.upstream(), expected_upstream);
        }
    }

    #[test]
    fn rejects_zero_items() {
        let (stages, recorder) = fixtures();
        assert!(matches!(
            build_task_graph(0, &stages, &recorder),
            Err(HarnessError::InvalidArgument(_))
        ));
        assert!(matches!(
            build_task_graph(MAX_ITEMS + 1, &stages, &recorder),
            Err(HarnessError::InvalidArgument(_))
        ));
    }
}
