use crate::{
    error::HarnessError,
    pipeline::stage::{ItemId, Stage, TaskKey},
    types::HashSet,
};
use parking_lot::Mutex;
use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Execution window of one stage of one item.
///
/// Times are relative to the moment the run's clock was started.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    /// Item the stage belongs to.
    pub item: ItemId,
    /// Stage kind.
    pub stage: Stage,
    /// Pool worker that ran the stage.
    pub worker: usize,
    /// When the stage body started.
    pub start: Duration,
    /// When the stage body returned.
    pub end: Duration,
    /// Whether the body returned `Ok`.
    pub succeeded: bool,
}

impl ExecutionEvent {
    /// Length of the execution window.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// Whether the half-open windows `[start, end)` intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Stage instance this event belongs to.
    pub fn key(&self) -> TaskKey {
        TaskKey {
            item: self.item,
            stage: self.stage,
        }
    }
}

/// Error returned when a stage is recorded twice.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    /// An event for this item and stage already exists.
    #[error("event for item {item}, {stage} already recorded")]
    Duplicate {
        /// Item of the rejected event.
        item: ItemId,
        /// Stage of the rejected event.
        stage: Stage,
    },
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Vec<ExecutionEvent>,
    seen: HashSet<TaskKey>,
}

/// Append-only, thread-safe log of [`ExecutionEvent`]s.
///
/// Events are only read back after the run; insertion order carries no
/// meaning.
#[derive(Debug)]
pub struct EventRecorder {
    epoch: OnceLock<Instant>,
    state: Mutex<RecorderState>,
}

impl EventRecorder {
    /// Recorder with room for `capacity` events reserved up front.
    ///
    /// # Errors
    /// [`HarnessError::AllocationFailure`] if the memory cannot be reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self, HarnessError> {
        let allocation_failure = |_| HarnessError::AllocationFailure {
            what: "event log",
            requested: capacity,
        };
        let mut state = RecorderState::default();
        state
            .events
            .try_reserve_exact(capacity)
            .map_err(allocation_failure)?;
        state.seen.try_reserve(capacity).map_err(allocation_failure)?;
        Ok(Self {
            epoch: OnceLock::new(),
            state: Mutex::new(state),
        })
    }

    /// Start the run clock. Later calls keep the first instant.
    pub fn start_clock(&self) -> Instant {
        *self.epoch.get_or_init(Instant::now)
    }

    /// Time since [`EventRecorder::start_clock`], zero before it.
    pub fn elapsed(&self) -> Duration {
        self.epoch.get().map_or(Duration::ZERO, Instant::elapsed)
    }

    /// Append `event`.
    ///
    /// # Errors
    /// [`RecordError::Duplicate`] if its item and stage were recorded before;
    /// the log is left unchanged.
    pub fn record(&self, event: ExecutionEvent) -> Result<(), RecordError> {
        let mut state = self.state.lock();
        if !state.seen.insert(event.key()) {
            return Err(RecordError::Duplicate {
                item: event.item,
                stage: event.stage,
            });
        }
        state.events.push(event);
        Ok(())
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every event and return them sorted with [`sort_events`].
    pub fn take_sorted(&self) -> Vec<ExecutionEvent> {
        let mut events = core::mem::take(&mut self.state.lock().events);
        sort_events(&mut events);
        events
    }
}

/// Sort by start time, then worker, item and stage.
pub fn sort_events(events: &mut [ExecutionEvent]) {
    events.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(a.worker.cmp(&b.worker))
            .then(a.item.cmp(&b.item))
            .then(a.stage.cmp(&b.stage))
    });
}
