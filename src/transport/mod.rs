//! Point-to-point message transport between group members.
//!
//! A transport delivers [`WireMessage`]s to members by id and surfaces what it
//! receives, plus "this member is unreachable" signals, on a single inbound
//! queue. The group channel drains that queue from its event loop.
//!
//! Two implementations:
//! - [`mock::MockNetwork`]: in-process crossbeam queues with crash, isolation
//!   and random message loss, for tests.
//! - [`tcp::TcpTransport`]: length-prefixed frames over TCP.

use crossbeam_channel::Receiver;

use crate::error::TransportError;
use crate::membership::ProcessId;
use crate::protocol::WireMessage;

pub mod mock;
pub mod tcp;

pub use mock::{ChaosConfig, MockEndpoint, MockNetwork};
pub use tcp::TcpTransport;

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A message arrived from a member.
    Received { from: ProcessId, message: WireMessage },
    /// An earlier send to `to` could not be completed.
    Undeliverable { to: ProcessId },
}

pub trait Transport {
    /// Id of the member this transport sends as.
    fn local_id(&self) -> ProcessId;

    /// Send one message without blocking on the network.
    ///
    /// Unreachable destinations surface either as `Err(Undeliverable)` here or
    /// later as [`TransportEvent::Undeliverable`]; both feed the failure
    /// detector's fast path.
    fn send_to(&self, to: ProcessId, message: WireMessage) -> Result<(), TransportError>;

    /// Inbound messages and asynchronous delivery failures.
    fn inbound(&self) -> &Receiver<TransportEvent>;
}
