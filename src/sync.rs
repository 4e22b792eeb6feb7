#[cfg(feature = "loom")]
mod imp {
    use crate::{
        executor::{OutputSlot, ParentInfoSlot, TaskSlot},
        token::DependencyToken,
        types::{HashMap, TaskId},
    };
    pub(crate) use loom::{
        cell::UnsafeCell,
        sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering, fence},
        thread,
    };
    pub(crate) use std::sync::Arc;

    pub(crate) type TaskSlots<'a, C> = Arc<Vec<TaskSlot<C>>>;
    pub(crate) type OutputSlots<'a, C> = Arc<Vec<OutputSlot<C>>>;
    pub(crate) type ParentInfoSlots<'a> = Arc<Vec<ParentInfoSlot>>;
    pub(crate) type TokenSlots<'a> = Arc<Vec<DependencyToken>>;
    pub(crate) type TaskIdSlots<'a> = Arc<Vec<TaskId>>;
    pub(crate) type TaskIndexMap<'a> = Arc<HashMap<TaskId, u32>>;

    pub(crate) fn join(lhs: impl FnOnce() + Send + 'static, rhs: impl FnOnce() + Send + 'static) {
        let lhs = thread::spawn(lhs);
        let rhs = thread::spawn(rhs);
        lhs.join().unwrap();
        rhs.join().unwrap();
    }

    /// Loom threads carry no pool index.
    pub(crate) fn worker_index() -> usize {
        0
    }
}

#[cfg(not(feature = "loom"))]
mod imp {
    use crate::{
        executor::{OutputSlot, ParentInfoSlot, TaskSlot},
        token::DependencyToken,
        types::{HashMap, SyncUnsafeCell, TaskId},
    };
    pub(crate) use core::{
        cell::UnsafeCell,
        sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering, fence},
    };

    pub(crate) type TaskSlots<'a, C> = &'a [TaskSlot<C>];
    pub(crate) type OutputSlots<'a, C> = &'a [OutputSlot<C>];
    pub(crate) type ParentInfoSlots<'a> = &'a [ParentInfoSlot];
    pub(crate) type TokenSlots<'a> = &'a [DependencyToken];
    pub(crate) type TaskIdSlots<'a> = &'a [TaskId];
    pub(crate) type TaskIndexMap<'a> = &'a HashMap<TaskId, u32>;

    pub(crate) fn join(lhs: impl FnOnce() + Send, rhs: impl FnOnce() + Send) {
        rayon::join(lhs, rhs);
    }

    /// Index of the pool worker running the caller, `0` outside any pool.
    pub(crate) fn worker_index() -> usize {
        rayon::current_thread_index().unwrap_or(0)
    }

    pub(crate) trait LoomPtrCompat: Sized {
        type Ptr;
        fn with<R>(self, f: impl FnOnce(Self::Ptr) -> R) -> R;
    }

    impl<T> LoomPtrCompat for *const T {
        type Ptr = *const T;
        fn with<R>(self, f: impl FnOnce(Self::Ptr) -> R) -> R {
            f(self)
        }
    }

    impl<T> LoomPtrCompat for *mut T {
        type Ptr = *mut T;
        fn with<R>(self, f: impl FnOnce(Self::Ptr) -> R) -> R {
            f(self)
        }
    }

    pub(crate) trait LoomUnsafeCellCompat<T> {
        fn get_mut(&self) -> impl LoomPtrCompat<Ptr = *mut T>;
    }

    impl<T> LoomUnsafeCellCompat<T> for SyncUnsafeCell<T> {
        fn get_mut(&self) -> impl LoomPtrCompat<Ptr = *mut T> {
            self.get()
        }
    }
}

pub(crate) use imp::*;
