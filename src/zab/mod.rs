//! Leader-based total-order broadcast.
//!
//! The leader batches client messages into proposals numbered
//! `(epoch, serial)` and broadcasts them. Replicas accept a proposal only if
//! it belongs to their epoch and its serial is newer than anything they
//! accepted before. Once a strict majority of the members still `Correct` has
//! accepted, the leader broadcasts a commit and every replica delivers the
//! batch with consecutive serials starting at `message_start`.
//!
//! Only one proposal is in flight at a time. Proposals in flight when their
//! leader fails are dropped, never re-proposed.

pub mod acceptor;
pub mod pipeline;
pub mod proposer;
pub mod quorum;

pub use acceptor::{Acceptor, Vote};
pub use pipeline::{PipelineAction, ZabPipeline};
pub use proposer::Proposer;
pub use quorum::{VoteTally, VoterSet};
