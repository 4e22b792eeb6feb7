use crate::{
    executor::ExecutionSummary,
    pipeline::{
        options::Verbosity,
        recorder::ExecutionEvent,
        stage::{ItemId, Stage, TaskKey},
    },
    types::HashMap,
};
use core::fmt;
use std::{collections::BTreeMap, time::Duration};

/// What happened to one stage of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage published this value.
    Completed(u64),
    /// The stage body failed with this reason.
    Failed(String),
    /// The stage never ran: an upstream stage failed or the run was
    /// cancelled.
    Blocked,
}

impl StageOutcome {
    /// Published value, if the stage completed.
    pub fn value(&self) -> Option<u64> {
        match self {
            Self::Completed(value) => Some(*value),
            Self::Failed(_) | Self::Blocked => None,
        }
    }
}

/// Logical result of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    /// Item id.
    pub item: ItemId,
    /// Outcome of stage A.
    pub produce: StageOutcome,
    /// Outcome of stage B.
    pub transform: StageOutcome,
    /// Outcome of stage C; on success the value it observed.
    pub consume: StageOutcome,
}

impl ItemResult {
    /// Outcome of `stage`.
    pub fn outcome(&self, stage: Stage) -> &StageOutcome {
        match stage {
            Stage::Produce => &self.produce,
            Stage::Transform => &self.transform,
            Stage::Consume => &self.consume,
        }
    }

    /// Whether all three stages completed.
    pub fn is_complete(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|stage| matches!(self.outcome(*stage), StageOutcome::Completed(_)))
    }

    /// Value observed by Consume.
    pub fn consumed(&self) -> Option<u64> {
        self.consume.value()
    }
}

/// Busy window of one worker over a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WorkerWindow {
    /// Worker index.
    pub worker: usize,
    /// Start of the worker's first stage.
    pub first_start: Duration,
    /// End of the worker's last stage.
    pub last_end: Duration,
    /// Sum of the worker's stage durations.
    pub busy: Duration,
    /// Stages the worker ran.
    pub tasks: usize,
}

impl WorkerWindow {
    /// Busy time as a fraction of `elapsed`, in `[0, 1]`.
    pub fn utilization(&self, elapsed: Duration) -> f64 {
        if elapsed.is_zero() {
            return 0.0;
        }
        (self.busy.as_secs_f64() / elapsed.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// Everything observed during one pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    workers: usize,
    elapsed: Duration,
    events: Vec<ExecutionEvent>,
    /// Position of every event in `events`.
    event_index: HashMap<TaskKey, usize>,
    items: Vec<ItemResult>,
    summary: ExecutionSummary,
    verbosity: Verbosity,
}

impl RunReport {
    /// Assemble a report. `events` must already be sorted with
    /// [`sort_events`](crate::pipeline::sort_events).
    pub fn new(
        workers: usize,
        elapsed: Duration,
        events: Vec<ExecutionEvent>,
        items: Vec<ItemResult>,
        summary: ExecutionSummary,
        verbosity: Verbosity,
    ) -> Self {
        let event_index = events
            .iter()
            .enumerate()
            .map(|(idx, event)| (event.key(), idx))
            .collect();
        Self {
            workers,
            elapsed,
            events,
            event_index,
            items,
            summary,
            verbosity,
        }
    }

    /// Worker pool size of the run.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Wall time from the first dispatch until the executor returned.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Recorded events, sorted by start time.
    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    /// Per-item results, indexed by item id.
    pub fn items(&self) -> &[ItemResult] {
        &self.items
    }

    /// Executor task counts.
    pub fn summary(&self) -> ExecutionSummary {
        self.summary
    }

    /// Report selected for rendering.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Whether every stage of every item completed.
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    /// Number of failed stages.
    pub fn failure_count(&self) -> usize {
        self.summary.failed
    }

    /// Items with at least one stage that did not complete.
    pub fn incomplete_items(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|item| !item.is_complete())
    }

    /// Event of `stage` of `item`, if it ran.
    pub fn event(&self, item: ItemId, stage: Stage) -> Option<&ExecutionEvent> {
        let idx = *self.event_index.get(&TaskKey { item, stage })?;
        Some(&self.events[idx])
    }

    /// Whether two events of different items ran at the same time.
    pub fn has_cross_item_overlap(&self) -> bool {
        // Sorted by start: only successors starting before `a` ends can overlap it.
        self.events.iter().enumerate().any(|(idx, a)| {
            self.events[idx + 1..]
                .iter()
                .take_while(|b| b.start < a.end)
                .any(|b| b.item != a.item && a.overlaps(b))
        })
    }

    /// Busy windows per worker, ordered by worker index.
    pub fn worker_windows(&self) -> Vec<WorkerWindow> {
        let mut windows: BTreeMap<usize, WorkerWindow> = BTreeMap::new();
        for event in &self.events {
            let window = windows.entry(event.worker).or_insert(WorkerWindow {
                worker: event.worker,
                first_start: event.start,
                last_end: event.end,
                busy: Duration::ZERO,
                tasks: 0,
            });
            window.first_start = window.first_start.min(event.start);
            window.last_end = window.last_end.max(event.end);
            window.busy += event.duration();
            window.tasks += 1;
        }
        windows.into_values().collect()
    }

    /// Per-item completion table.
    pub fn summary_table(&self) -> SummaryTable<'_> {
        SummaryTable(self)
    }

    /// Chronological event list.
    pub fn event_log(&self) -> EventLog<'_> {
        EventLog(self)
    }

    /// Worker utilization table.
    pub fn utilization(&self) -> Utilization<'_> {
        Utilization(self)
    }
}

/// Renders the report selected by the run's [`Verbosity`], followed by the
/// worker utilization and the outcome line.
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total elapsed time: {:.6} s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Workers: {}", self.workers)?;
        writeln!(f)?;
        match self.verbosity {
            Verbosity::Summary => write!(f, "{}", self.summary_table())?,
            Verbosity::Events => write!(f, "{}", self.event_log())?,
        }
        writeln!(f)?;
        write!(f, "{}", self.utilization())?;
        writeln!(f)?;
        let ExecutionSummary {
            total,
            completed,
            failed,
            not_run,
        } = self.summary;
        if self.is_success() {
            writeln!(f, "All {total} tasks completed.")
        } else {
            writeln!(
                f,
                "Run incomplete: {completed}/{total} tasks completed, {failed} failed, {not_run} blocked."
            )
        }
    }
}

fn secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Per-item table of stage completion times.
pub struct SummaryTable<'a>(&'a RunReport);

impl fmt::Display for SummaryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "Summary (per item):")?;
        writeln!(f, "Item | A_end    | B_end    | C_end")?;
        writeln!(f, "-----+----------+----------+----------")?;
        for result in &report.items {
            write!(f, "{:4}", result.item)?;
            for stage in Stage::ALL {
                match (result.outcome(stage), report.event(result.item, stage)) {
                    (StageOutcome::Completed(_), Some(event)) => {
                        write!(f, " | {:8.4}", secs(event.end))?;
                    }
                    (StageOutcome::Failed(_), _) => write!(f, " | {:>8}", "failed")?,
                    _ => write!(f, " | {:>8}", "blocked")?,
                }
            }
            if !result.is_complete() {
                write!(f, "  incomplete")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Chronological list of every recorded event.
pub struct EventLog<'a>(&'a RunReport);

impl fmt::Display for EventLog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Event log (sorted by start time):")?;
        writeln!(f, "Start    End      Dur      TID  Item  Stage")?;
        writeln!(f, "-------- -------- -------- ---- ----- ----------------")?;
        for event in &self.0.events {
            write!(
                f,
                "{:8.4} {:8.4} {:8.4} {:4} {:5} {}",
                secs(event.start),
                secs(event.end),
                secs(event.duration()),
                event.worker,
                event.item,
                event.stage,
            )?;
            if !event.succeeded {
                write!(f, " [failed]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Per-worker busy windows.
pub struct Utilization<'a>(&'a RunReport);

impl fmt::Display for Utilization<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "Worker utilization:")?;
        writeln!(f, "TID  First    Last     Busy     Tasks  Util")?;
        writeln!(f, "---- -------- -------- -------- ----- -----")?;
        for window in report.worker_windows() {
            writeln!(
                f,
                "{:4} {:8.4} {:8.4} {:8.4} {:5} {:4.0}%",
                window.worker,
                secs(window.first_start),
                secs(window.last_end),
                secs(window.busy),
                window.tasks,
                window.utilization(report.elapsed) * 100.0,
            )?;
        }
        Ok(())
    }
}
