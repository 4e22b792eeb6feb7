use crate::{
    error::HarnessError,
    pipeline::stage::{DEFAULT_COST_UNIT, StageCosts},
};
use core::num::NonZeroUsize;

/// Item count used when none is given.
pub const DEFAULT_ITEMS: u32 = 8;
/// Largest item count whose task ids still fit a `TaskId`.
pub const MAX_ITEMS: u32 = (u32::MAX - 1) / 3;

/// Size of the worker pool.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum WorkerCount {
    /// One worker per available core.
    #[default]
    Available,
    /// Exactly this many workers.
    Fixed(NonZeroUsize),
}

impl WorkerCount {
    /// Concrete worker count. Falls back to one worker when the available
    /// parallelism cannot be queried.
    pub fn resolve(self) -> NonZeroUsize {
        match self {
            Self::Available => std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            Self::Fixed(workers) => workers,
        }
    }
}

/// Which report a run renders.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Verbosity {
    /// One line per item with stage completion times.
    Summary,
    /// Every event, sorted by start time.
    #[default]
    Events,
}

impl TryFrom<i64> for Verbosity {
    type Error = HarnessError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Summary),
            1 => Ok(Self::Events),
            other => Err(HarnessError::invalid(format!(
                "verbosity must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Parameters of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Number of items, `N`.
    pub items: u32,
    /// Worker pool size.
    pub workers: WorkerCount,
    /// Report to render.
    pub verbosity: Verbosity,
    /// Relative stage costs.
    pub costs: StageCosts,
    /// Hash-mixing rounds per unit of cost.
    pub cost_unit: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            items: DEFAULT_ITEMS,
            workers: WorkerCount::default(),
            verbosity: Verbosity::default(),
            costs: StageCosts::default(),
            cost_unit: DEFAULT_COST_UNIT,
        }
    }
}

impl PipelineOptions {
    /// Defaults with `items` items.
    pub fn new(items: u32) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    /// Replace the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: WorkerCount) -> Self {
        self.workers = workers;
        self
    }

    /// Replace the verbosity.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Replace the stage costs and the cost unit.
    #[must_use]
    pub fn with_costs(mut self, costs: StageCosts, cost_unit: u32) -> Self {
        self.costs = costs;
        self.cost_unit = cost_unit;
        self
    }

    /// Options from signed command-line values.
    ///
    /// `workers == None` selects every available core.
    ///
    /// # Errors
    /// [`HarnessError::InvalidArgument`] if `items` or `workers` is not
    /// positive, `items` exceeds [`MAX_ITEMS`], or `verbosity` is neither 0
    /// nor 1.
    pub fn from_raw(
        items: i64,
        workers: Option<i64>,
        verbosity: i64,
    ) -> Result<Self, HarnessError> {
        if items <= 0 {
            return Err(HarnessError::invalid(format!(
                "items must be > 0, got {items}"
            )));
        }
        let items = u32::try_from(items)
            .ok()
            .filter(|items| *items <= MAX_ITEMS)
            .ok_or_else(|| {
                HarnessError::invalid(format!("items must be <= {MAX_ITEMS}, got {items}"))
            })?;
        let workers = match workers {
            None => WorkerCount::Available,
            Some(workers) => usize::try_from(workers)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(WorkerCount::Fixed)
                .ok_or_else(|| {
                    HarnessError::invalid(format!("workers must be > 0, got {workers}"))
                })?,
        };
        let options = Self {
            items,
            workers,
            verbosity: Verbosity::try_from(verbosity)?,
            ..Self::default()
        };
        options.validate()?;
        Ok(options)
    }

    /// Check the options before anything is scheduled.
    ///
    /// # Errors
    /// [`HarnessError::InvalidArgument`] describing the first bad field.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.items == 0 {
            return Err(HarnessError::invalid("items must be > 0"));
        }
        if self.items > MAX_ITEMS {
            return Err(HarnessError::invalid(format!(
                "items must be <= {MAX_ITEMS}, got {}",
                self.items
            )));
        }
        if self.cost_unit == 0 {
            return Err(HarnessError::invalid("cost unit must be > 0"));
        }
        Ok(())
    }

    /// Tasks in the graph: three per item.
    pub fn total_tasks(&self) -> usize {
        self.items as usize * 3
    }
}
