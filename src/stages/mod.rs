//! Per-channel protocol stages below the ordering pipeline.
//!
//! Events flow upward: the failure detector feeds membership transitions to
//! broadcast and election, and election feeds leadership to [`crate::zab`].
//! Each stage keeps its own copy of the membership view; only the failure
//! detector mutates the authoritative one.

pub mod broadcast;
pub mod election;
pub mod failure_detector;

pub use broadcast::{BestEffortBroadcast, Fanout};
pub use election::LeaderElection;
pub use failure_detector::FailureDetector;
