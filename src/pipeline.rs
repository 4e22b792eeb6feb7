mod graph;
mod harness;
mod options;
mod recorder;
mod report;
mod stage;

pub use crate::pipeline::{
    graph::{PipelineConfig, StageTask, StageTaskConfig, build_task_graph},
    harness::Harness,
    options::{DEFAULT_ITEMS, MAX_ITEMS, PipelineOptions, Verbosity, WorkerCount},
    recorder::{EventRecorder, ExecutionEvent, RecordError, sort_events},
    report::{
        EventLog, ItemResult, RunReport, StageOutcome, SummaryTable, Utilization, WorkerWindow,
    },
    stage::{
        DEFAULT_COST_UNIT, ItemId, PipelineStages, Stage, StageCosts, StageError, SyntheticStages,
        TaskKey, simulate_cost,
    },
};
