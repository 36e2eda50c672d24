//! Protocol vocabulary.
//!
//! - [`message`]: what travels between processes (one variant per kind).
//! - [`event`]: what the stages of one channel raise for each other.
//! - [`frame`]: length-prefixed stream framing used over TCP.

pub mod event;
pub mod frame;
pub mod message;

pub use event::{ElectionEvent, MembershipEvent};
pub use frame::Envelope;
pub use message::{Epoch, Payload, Proposal, ProposalId, WireMessage};
