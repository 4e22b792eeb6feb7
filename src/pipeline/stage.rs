use crate::types::TaskId;
use core::{fmt::Debug, hint::black_box};
use derive_more::Display;
use thiserror::Error;

/// Identifier of a pipeline item, `0..N`.
pub type ItemId = u32;

/// Iterations of the hash-mixing loop per unit of stage cost.
pub const DEFAULT_COST_UNIT: u32 = 120_000;

/// One phase of an item's pipeline.
#[derive(Debug, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Stage A: creates the item's value.
    #[display("A (produce)")]
    Produce,
    /// Stage B: derives a new value from A's output.
    #[display("B (transform)")]
    Transform,
    /// Stage C: observes B's output. Terminal.
    #[display("C (consume)")]
    Consume,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Self; 3] = [Self::Produce, Self::Transform, Self::Consume];

    /// Position in the pipeline, `0..3`.
    pub const fn index(self) -> u32 {
        match self {
            Self::Produce => 0,
            Self::Transform => 1,
            Self::Consume => 2,
        }
    }

    /// Single-letter label used in compact output.
    pub const fn letter(self) -> char {
        match self {
            Self::Produce => 'A',
            Self::Transform => 'B',
            Self::Consume => 'C',
        }
    }

    /// The stage whose output this one reads.
    pub const fn upstream(self) -> Option<Self> {
        match self {
            Self::Produce => None,
            Self::Transform => Some(Self::Produce),
            Self::Consume => Some(Self::Transform),
        }
    }
}

/// A stage instance bound to one item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskKey {
    /// Item the stage belongs to.
    pub item: ItemId,
    /// Stage kind.
    pub stage: Stage,
}

impl TaskKey {
    /// Executor id of this stage: `3 * item + stage + 1`.
    ///
    /// `None` when the id does not fit.
    pub fn task_id(self) -> Option<TaskId> {
        self.item
            .checked_mul(3)?
            .checked_add(self.stage.index())?
            .checked_add(1)
            .and_then(TaskId::new)
    }

    /// Inverse of [`TaskKey::task_id`].
    pub fn from_task_id(task_id: TaskId) -> Self {
        let raw = task_id.get() - 1;
        Self {
            item: raw / 3,
            stage: Stage::ALL[(raw % 3) as usize],
        }
    }
}

/// Failure of one stage body for one item.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{stage} failed for item {item}: {reason}")]
pub struct StageError {
    /// Item whose stage failed.
    pub item: ItemId,
    /// Failed stage.
    pub stage: Stage,
    /// What went wrong.
    pub reason: String,
}

impl StageError {
    /// New error for `stage` of `item`.
    pub fn new(item: ItemId, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            item,
            stage,
            reason: reason.into(),
        }
    }
}

/// The computational bodies of the three stages.
///
/// Bodies must be deterministic functions of their inputs and must not
/// block, sleep or perform I/O, so that recorded timings reflect CPU work
/// only.
pub trait PipelineStages: Debug + Send + Sync + 'static {
    /// Stage A: create the value of `item`.
    ///
    /// # Errors
    /// If the value cannot be produced.
    fn produce(&self, item: ItemId) -> Result<u64, StageError>;

    /// Stage B: derive a value from A's output.
    ///
    /// # Errors
    /// If the value cannot be transformed.
    fn transform(&self, item: ItemId, produced: u64) -> Result<u64, StageError>;

    /// Stage C: observe B's output.
    ///
    /// # Errors
    /// If the value is rejected.
    fn consume(&self, item: ItemId, transformed: u64) -> Result<(), StageError>;
}

/// Relative cost of each stage, in units of [`DEFAULT_COST_UNIT`]-sized work.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StageCosts {
    /// Cost of stage A.
    pub produce: u32,
    /// Cost of stage B.
    pub transform: u32,
    /// Cost of stage C.
    pub consume: u32,
}

impl Default for StageCosts {
    fn default() -> Self {
        Self {
            produce: 2,
            transform: 3,
            consume: 1,
        }
    }
}

impl StageCosts {
    /// Cost of `stage`.
    pub const fn of(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Produce => self.produce,
            Stage::Transform => self.transform,
            Stage::Consume => self.consume,
        }
    }
}

/// Burn `cost * unit` rounds of integer hash mixing and return the hash.
///
/// Pure CPU work with a deterministic result; never sleeps.
#[inline(never)]
pub fn simulate_cost(cost: u32, unit: u32) -> u64 {
    let rounds = u64::from(cost) * u64::from(unit);
    let mut hash: u64 = 0x517c_c1b7_2722_0a95;
    for i in 0..rounds {
        hash ^= i;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
        hash = hash.rotate_left(17);
    }
    black_box(hash)
}

/// Default stage bodies: A yields the item id, B doubles it, C observes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticStages {
    costs: StageCosts,
    cost_unit: u32,
}

impl Default for SyntheticStages {
    fn default() -> Self {
        Self::new(StageCosts::default(), DEFAULT_COST_UNIT)
    }
}

impl SyntheticStages {
    /// Bodies burning `costs.of(stage) * cost_unit` rounds each.
    pub fn new(costs: StageCosts, cost_unit: u32) -> Self {
        Self { costs, cost_unit }
    }

    fn burn(&self, stage: Stage) {
        black_box(simulate_cost(self.costs.of(stage), self.cost_unit));
    }
}

impl PipelineStages for SyntheticStages {
    fn produce(&self, item: ItemId) -> Result<u64, StageError> {
        self.burn(Stage::Produce);
        Ok(u64::from(item))
    }

    fn transform(&self, item: ItemId, produced: u64) -> Result<u64, StageError> {
        self.burn(Stage::Transform);
        produced
            .checked_mul(2)
            .ok_or_else(|| StageError::new(item, Stage::Transform, "value overflow"))
    }

    fn consume(&self, _item: ItemId, transformed: u64) -> Result<(), StageError> {
        self.burn(Stage::Consume);
        black_box(transformed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels() {
        assert_eq!(Stage::Produce.to_string(), "A (produce)");
        assert_eq!(Stage::Transform.to_string(), "B (transform)");
        assert_eq!(Stage::Consume.to_string(), "C (consume)");
        let letters: String = Stage::ALL.iter().map(|stage| stage.letter()).collect();
        assert_eq!(letters, "ABC");
        assert_eq!(Stage::Consume.upstream(), Some(Stage::Transform));
        assert_eq!(Stage::Produce.upstream(), None);
    }

    #[test]
    fn task_keys_map_to_distinct_ids() {
        for item in [0, 1, 7, 1000] {
            for stage in Stage::ALL {
                let key = TaskKey { item, stage };
                let id = key.task_id().unwrap();
                assert_eq!(id.get(), item * 3 + stage.index() + 1);
                assert_eq!(TaskKey::from_task_id(id), key);
            }
        }
        let too_big = TaskKey {
            item: u32::MAX / 3 + 1,
            stage: Stage::Produce,
        };
        assert_eq!(too_big.task_id(), None);
    }

    #[test]
    fn simulated_cost_is_deterministic() {
        assert_eq!(simulate_cost(0, 1000), 0x517c_c1b7_2722_0a95);
        assert_eq!(simulate_cost(3, 50), simulate_cost(3, 50));
        assert_eq!(simulate_cost(3, 50), simulate_cost(1, 150));
        assert_ne!(simulate_cost(1, 10), simulate_cost(2, 10));
    }

    #[test]
    fn synthetic_bodies_chain_values() {
        let stages = SyntheticStages::new(StageCosts::default(), 1);
        let produced = stages.produce(21).unwrap();
        assert_eq!(produced, 21);
        assert_eq!(stages.transform(21, produced), Ok(42));
        assert_eq!(stages.consume(21, 42), Ok(()));
    }

    #[test]
    fn transform_reports_overflow() {
        let stages = SyntheticStages::new(StageCosts::default(), 1);
        let error = stages.transform(5, u64::MAX).unwrap_err();
        assert_eq!(error.stage, Stage::Transform);
        assert_eq!(error.item, 5);
        assert_eq!(
            error.to_string(),
            "B (transform) failed for item 5: value overflow"
        );
    }
}
