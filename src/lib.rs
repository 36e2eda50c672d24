//! Group communication for a replicated back end.
//!
//! A fixed group of processes, each running one [`GroupChannel`]:
//!
//! - heartbeat failure detection ([`stages::FailureDetector`])
//! - best-effort broadcast ([`stages::BestEffortBroadcast`])
//! - deterministic leader election ([`stages::LeaderElection`])
//! - leader-driven total-order broadcast ([`zab::ZabPipeline`])
//!
//! Messages submitted at any replica are delivered to every replica's
//! [`CommListener`] in the same order with increasing serial numbers, as long
//! as the fail-stop assumption holds.

pub mod channel;
pub mod chaos;
pub mod config;
pub mod error;
pub mod membership;
pub mod protocol;
pub mod stages;
pub mod transport;
pub mod zab;

pub use channel::{ChannelHandle, Command, CommListener, GroupChannel};
pub use config::CommConfig;
pub use error::{CommError, FrameError, TransportError};
pub use membership::{MembershipView, ProcessId, ProcessState};
pub use protocol::{Payload, ProposalId, WireMessage};
pub use transport::{MockNetwork, TcpTransport, Transport, TransportEvent};

/// Process exit status when the local member address cannot be bound.
pub const EXIT_BIND_FAILURE: i32 = 2;
