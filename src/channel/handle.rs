//! Cross-thread access to a running channel.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::CommError;
use crate::membership::ProcessId;
use crate::protocol::Payload;

/// Request for a channel running [`super::GroupChannel::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(Vec<Payload>),
    SendP2p { to: ProcessId, payload: Payload },
    Shutdown,
}

/// Cloneable sender of [`Command`]s.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    tx: Sender<Command>,
}

impl ChannelHandle {
    /// A handle and the receiver to pass to `run`.
    pub fn new() -> (Self, Receiver<Command>) {
        let (tx, rx) = unbounded();
        (ChannelHandle { tx }, rx)
    }

    pub fn submit(&self, payload: Payload) -> Result<(), CommError> {
        self.submit_batch(vec![payload])
    }

    pub fn submit_batch(&self, payloads: Vec<Payload>) -> Result<(), CommError> {
        self.send(Command::Submit(payloads))
    }

    pub fn send_p2p(&self, to: ProcessId, payload: Payload) -> Result<(), CommError> {
        self.send(Command::SendP2p { to, payload })
    }

    pub fn shutdown(&self) -> Result<(), CommError> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<(), CommError> {
        self.tx.send(command).map_err(|_| CommError::ChannelClosed)
    }
}
