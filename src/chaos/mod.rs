//! Fault injection harness.
//!
//! [`runner::Cluster`] runs a whole group over the mock network on a virtual
//! clock, with crashes, isolation and random loss. [`checker::Checker`]
//! verifies the recorded deliveries.

pub mod checker;
pub mod runner;

#[cfg(test)]
mod tests;

pub use checker::{CheckResult, CheckStats, Checker, DeliveryHistory, Violation, ViolationKind};
pub use runner::{Cluster, RecordingListener, Replica};
