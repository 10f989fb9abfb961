//! Nimbus Core - reconciliation engine and lifecycle tasks
//!
//! This crate provides:
//! - `Reconciler`: per-allocation validation of members, quotas, labels and
//!   limit ranges, as a dry run or enforcing
//! - Lifecycle tasks: activate, disable, add and remove users
//! - A bounded poller with an injectable sleep
//! - Inline or queued task dispatch

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod engine;
pub mod poll;
pub mod report;
pub mod tasks;

#[cfg(test)]
mod fake;

pub use config::TaskConfig;
pub use dispatch::{DispatchStats, QueuedDispatcher, TaskDispatcher};
pub use engine::{Reconciler, reconcile};
pub use poll::{Poller, Sleeper, TokioSleeper};
pub use report::{
    Action, Discrepancy, DiscrepancyKind, Outcome, RunSummary, SkipReason, ValidationReport,
};
pub use tasks::{Activation, Task, TaskRunner};
