//! feedwatch-engine: the polling cycle and the per-source scheduler.
//!
//! Control flow per tick: [`scheduler`] fires → [`cycle::run_cycle`] reads
//! the cursor, asks the [`SourceAdapter`] for newer items, plans with
//! `feedwatch_core::plan_cycle`, hands items to the [`NotificationSink`] in
//! order, and persists the last confirmed key.

pub mod adapter;
pub mod board;
pub mod cycle;
pub mod scheduler;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::SourceAdapter;
pub use board::StatusBoard;
pub use cycle::{CycleError, CycleOutcome, CycleReport, run_cycle};
pub use scheduler::{Scheduler, ShutdownReport, SourceTask};
pub use sink::NotificationSink;
