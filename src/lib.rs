//! Dependency-tracked pipeline harness on top of a concurrent DAG executor.
//!
//! The crate has two layers:
//! - A generic executor for Directed Acyclic Graphs of tasks. It orders tasks
//!   topologically at setup time, rejects cycles, and at run time releases a
//!   task the moment every parent published its output. Children with a
//!   single parent run on the parent's worker without synchronization;
//!   children with several parents are released by an atomic countdown with
//!   Release/Acquire fences. Each task publishes through a one-shot
//!   [`token::DependencyToken`].
//! - A Produce → Transform → Consume pipeline over `N` independent items,
//!   built as `3 × N` executor tasks. Stages of one item are chained by
//!   tokens; stages of different items share no edges and overlap freely on
//!   a bounded rayon pool. Every stage run is recorded as a timestamped
//!   [`pipeline::ExecutionEvent`] and rendered after the run.
//!
//! Quick start for the executor:
//! 1. Implement `Config` with your `Task` type.
//! 2. Implement `Task::setup` to declare parents via `SetupApi::subscribe`,
//!    and `Task::exec` to compute an output, reading parents via
//!    `ExecApi::read`.
//! 3. Build a map from `TaskId` to task configs, call `Executor::setup`, then
//!    `execute`.
//!
//! Quick start for the pipeline: build [`pipeline::PipelineOptions`], hand
//! them to [`pipeline::Harness::new`] and call `run`.
//!
//! A failing task never aborts the run: its dependents are left unrun, every
//! unrelated task still executes, and the summary reports the failure.

/// Public interface to configure the computation graph.
///
/// Exposes the `Config` trait which binds the task type for a concrete
/// instantiation of the executor.
pub mod config;
/// Crate-level error taxonomy of the pipeline harness.
pub mod error;
/// The concurrent DAG executor.
///
/// Graph setup (topological ordering, cycle and subscription checks) and
/// parallel execution with the failure and cancellation policies.
pub mod executor;
/// The Produce → Transform → Consume harness with event recording and
/// reports.
pub mod pipeline;
mod sync;
/// Task definitions and the setup/exec APIs exposed to tasks.
pub mod task;
/// One-shot dependency tokens and the cancellation signal.
pub mod token;
/// Core types shared across the crate (IDs, outputs, cell wrapper).
pub mod types;
mod utils;

pub use error::HarnessError;
