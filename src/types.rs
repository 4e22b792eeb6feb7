use crate::{config::Config, sync::UnsafeCell, task::Task};
use core::num::NonZeroU32;
use derive_more::{Deref, DerefMut};
use indexmap::{IndexMap as _IndexMap, IndexSet as _IndexSet};
use rustc_hash::FxBuildHasher;
use std::collections::{HashMap as _HashMap, HashSet as _HashSet};

/// `UnsafeCell` that is `Sync` when `T: Sync`.
///
/// Slots of this type are shared between workers; the executor guarantees a
/// slot is never written while another worker reads or writes it.
#[derive(Debug, Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Sync> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

/// Unique identifier of a task in the DAG.
pub type TaskId = NonZeroU32;
/// Configuration a task is built from.
pub type TaskConfig<C> = <<C as Config>::Task as Task<C>>::Config;
/// Value a task publishes to its children on success.
pub type TaskOutput<C> = <<C as Config>::Task as Task<C>>::Output;
/// Error a task reports on failure.
pub type TaskError<C> = <<C as Config>::Task as Task<C>>::Error;
/// What a task left behind in its slot: `None` until it has run.
pub(crate) type TaskResult<C> = Option<Result<TaskOutput<C>, TaskError<C>>>;

pub(crate) type HashMap<K, V> = _HashMap<K, V, FxBuildHasher>;
pub(crate) type HashSet<T> = _HashSet<T, FxBuildHasher>;
/// `IndexMap` type with fast hasher.
pub type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;
