#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use core::num::NonZeroUsize;
use pipeline_harness::{
    HarnessError,
    executor::Executor,
    pipeline::{
        EventRecorder, Harness, ItemId, PipelineConfig, PipelineOptions, PipelineStages,
        RunReport, Stage, StageCosts, StageError, StageOutcome, SyntheticStages, TaskKey,
        Verbosity, WorkerCount, build_task_graph,
    },
    token::TokenError,
};
use std::{collections::BTreeSet, sync::Arc};

const FAST_UNIT: u32 = 2_000;

fn options(items: u32, workers: usize) -> PipelineOptions {
    PipelineOptions::new(items)
        .with_workers(WorkerCount::Fixed(NonZeroUsize::new(workers).unwrap()))
        .with_costs(StageCosts::default(), FAST_UNIT)
}

fn run(options: PipelineOptions) -> RunReport {
    Harness::new(options).run().unwrap()
}

fn assert_stage_order(report: &RunReport) {
    for item in 0..report.items().len() as ItemId {
        let event = |stage| report.event(item, stage).unwrap();
        let (a, b, c) = (
            event(Stage::Produce),
            event(Stage::Transform),
            event(Stage::Consume),
        );
        assert!(a.end <= b.start, "item {item}: {a:?} then {b:?}");
        assert!(b.end <= c.start, "item {item}: {b:?} then {c:?}");
    }
}

#[test]
fn stages_of_an_item_run_in_order() {
    for workers in [1, 2, 4] {
        let report = run(options(16, workers));
        assert!(report.is_success());
        assert_stage_order(&report);
    }
}

#[test]
fn every_stage_is_recorded_once() {
    let items = 10;
    let report = run(options(items, 3));
    assert_eq!(report.events().len(), 3 * items as usize);
    for stage in Stage::ALL {
        let seen: BTreeSet<_> = report
            .events()
            .iter()
            .filter(|event| event.stage == stage)
            .map(|event| event.item)
            .collect();
        assert_eq!(seen, (0..items).collect::<BTreeSet<_>>());
    }
    assert!(
        report
            .events()
            .windows(2)
            .all(|pair| pair[0].start <= pair[1].start)
    );
}

#[test]
fn independent_items_overlap() {
    let options = options(4, 2).with_costs(StageCosts::default(), 200_000);
    let overlapped = (0..10).any(|_| run(options.clone()).has_cross_item_overlap());
    assert!(overlapped);
}

#[test]
fn results_do_not_depend_on_scheduling() {
    let items = 12;
    for workers in [1, 2, 4] {
        for _ in 0..3 {
            let report = run(options(items, workers));
            for result in report.items() {
                let i = u64::from(result.item);
                assert_eq!(result.produce, StageOutcome::Completed(i));
                assert_eq!(result.transform, StageOutcome::Completed(2 * i));
                assert_eq!(result.consumed(), Some(2 * i));
            }
        }
    }
}

#[test]
fn tokens_are_satisfied_exactly_once() {
    let stages = Arc::new(SyntheticStages::new(StageCosts::default(), FAST_UNIT));
    let recorder = Arc::new(EventRecorder::with_capacity(9).unwrap());
    let graph = build_task_graph(3, &stages, &recorder).unwrap();
    let mut executor = Executor::<PipelineConfig<SyntheticStages>>::setup(&graph).unwrap();
    for task_id in graph.keys() {
        assert!(!executor.token(*task_id).unwrap().is_satisfied());
    }

    recorder.start_clock();
    assert!(executor.execute().is_success());
    assert_eq!(recorder.len(), 9);
    for task_id in graph.keys() {
        let token = executor.token(*task_id).unwrap();
        assert!(token.is_satisfied());
        assert_eq!(token.satisfy(), Err(TokenError::AlreadySatisfied));
    }
}

#[test]
fn four_items_on_two_workers() {
    let options = PipelineOptions::new(4)
        .with_workers(WorkerCount::Fixed(NonZeroUsize::new(2).unwrap()))
        .with_costs(
            StageCosts {
                produce: 2,
                transform: 3,
                consume: 1,
            },
            FAST_UNIT,
        );
    let report = run(options);
    assert_eq!(report.events().len(), 12);
    let mut consumed: Vec<_> = report
        .events()
        .iter()
        .filter(|event| event.stage == Stage::Consume)
        .map(|event| event.item)
        .collect();
    consumed.sort_unstable();
    assert_eq!(consumed, [0, 1, 2, 3]);
    assert_stage_order(&report);
    assert!(report.events().iter().all(|event| event.worker < 2));
    assert!(report.worker_windows().len() <= 2);
}

#[test]
fn single_item_single_worker_is_serial() {
    let report = run(PipelineOptions::new(1).with_workers(WorkerCount::Fixed(NonZeroUsize::MIN)));
    let events = report.events();
    assert_eq!(events.len(), 3);
    let stages: Vec<_> = events.iter().map(|event| event.stage).collect();
    assert_eq!(stages, Stage::ALL);
    for pair in events.windows(2) {
        assert!(pair[0].start < pair[1].start);
        assert!(pair[0].end <= pair[1].start);
        assert!(!pair[0].overlaps(&pair[1]));
    }
    assert!(!report.has_cross_item_overlap());
    assert_eq!(report.worker_windows().len(), 1);
}

#[test]
fn zero_items_is_rejected_before_running() {
    let harness = Harness::new(PipelineOptions::new(0));
    match harness.run() {
        Err(HarnessError::InvalidArgument(message)) => assert_eq!(message, "items must be > 0"),
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
    assert!(matches!(
        PipelineOptions::from_raw(0, Some(2), 1),
        Err(HarnessError::InvalidArgument(_))
    ));
}

/// Synthetic bodies, except Transform of one item always fails.
#[derive(Debug)]
struct FailingTransform {
    inner: SyntheticStages,
    item: ItemId,
}

impl PipelineStages for FailingTransform {
    fn produce(&self, item: ItemId) -> Result<u64, StageError> {
        self.inner.produce(item)
    }

    fn transform(&self, item: ItemId, produced: u64) -> Result<u64, StageError> {
        if item == self.item {
            return Err(StageError::new(item, Stage::Transform, "injected"));
        }
        self.inner.transform(item, produced)
    }

    fn consume(&self, item: ItemId, transformed: u64) -> Result<(), StageError> {
        self.inner.consume(item, transformed)
    }
}

#[test]
fn failed_stage_blocks_only_its_item() {
    let stages = FailingTransform {
        inner: SyntheticStages::new(StageCosts::default(), FAST_UNIT),
        item: 2,
    };
    let report = Harness::with_stages(options(5, 2), stages).run().unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.summary().not_run, 1);
    let incomplete: Vec<_> = report.incomplete_items().map(|item| item.item).collect();
    assert_eq!(incomplete, [2]);

    let failed = &report.items()[2];
    assert_eq!(failed.produce, StageOutcome::Completed(2));
    assert_eq!(failed.transform, StageOutcome::Failed("injected".into()));
    assert_eq!(failed.consume, StageOutcome::Blocked);
    assert!(report.event(2, Stage::Consume).is_none());
    assert!(!report.event(2, Stage::Transform).unwrap().succeeded);
    assert_eq!(report.events().len(), 14);

    for result in report.items().iter().filter(|item| item.item != 2) {
        assert_eq!(result.consumed(), Some(2 * u64::from(result.item)));
    }
    let table = report.summary_table().to_string();
    assert!(table.contains("|   failed |  blocked  incomplete"));
}

#[test]
fn reports_follow_verbosity() {
    let summary = run(options(3, 2).with_verbosity(Verbosity::Summary)).to_string();
    assert!(summary.contains("Item | A_end    | B_end    | C_end"));
    assert!(!summary.contains("Event log"));
    assert!(summary.contains("Worker utilization:"));
    assert!(summary.ends_with("All 9 tasks completed.\n"));

    let events = run(options(3, 2).with_verbosity(Verbosity::Events)).to_string();
    assert!(events.contains("Start    End      Dur      TID  Item  Stage"));
    assert_eq!(events.matches("B (transform)").count(), 3);
}

#[test]
fn task_ids_follow_item_and_stage() {
    let key = TaskKey {
        item: 4,
        stage: Stage::Consume,
    };
    assert_eq!(key.task_id().unwrap().get(), 15);
}
