use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque application payload.
pub type Payload = Vec<u8>;

/// Leadership term. Starts at 0 and grows by exactly 1 per leader change.
pub type Epoch = u32;

/// Identity of one leader proposal.
///
/// Ordered lexicographically by `(epoch, serial)`; the derive relies on the
/// field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId {
    /// Epoch of the leader that issued the proposal.
    pub epoch: Epoch,
    /// Leader-assigned serial, strictly increasing within the epoch (first is 1).
    pub serial: u32,
}

impl ProposalId {
    pub fn new(epoch: Epoch, serial: u32) -> Self {
        ProposalId { epoch, serial }
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.epoch, self.serial)
    }
}

/// A numbered batch of application messages.
///
/// Message `k` of the batch is delivered with serial number
/// `message_start + k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub message_start: u64,
    pub messages: Vec<Payload>,
}

impl Proposal {
    /// Serial number the next batch after this one starts at.
    pub fn message_end(&self) -> u64 {
        self.message_start + self.messages.len() as u64
    }
}

/// Messages exchanged between processes of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Liveness signal, no payload.
    Heartbeat,

    /// Leader broadcasts a batch for acceptance.
    Propose(Proposal),

    /// Acceptor voted for the proposal.
    Accept(ProposalId),

    /// Acceptor refused the proposal (stale epoch or non-increasing serial).
    Deny(ProposalId),

    /// Leader saw a quorum of accepts; deliver the cached batch.
    Commit(ProposalId),

    /// Submission forwarded by a non-leader to the leader, at most once.
    Redirect(Vec<Payload>),

    /// Unordered point-to-point application message.
    P2p(Payload),
}

impl WireMessage {
    /// Serialize message to bytes using bincode.
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Heartbeat => "heartbeat",
            WireMessage::Propose(_) => "propose",
            WireMessage::Accept(_) => "accept",
            WireMessage::Deny(_) => "deny",
            WireMessage::Commit(_) => "commit",
            WireMessage::Redirect(_) => "redirect",
            WireMessage::P2p(_) => "p2p",
        }
    }

    /// The proposal this message refers to, if any.
    pub fn proposal_id(&self) -> Option<ProposalId> {
        match self {
            WireMessage::Propose(proposal) => Some(proposal.id),
            WireMessage::Accept(id) | WireMessage::Deny(id) | WireMessage::Commit(id) => Some(*id),
            WireMessage::Heartbeat | WireMessage::Redirect(_) | WireMessage::P2p(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_id_ordering() {
        assert!(ProposalId::new(0, 5) < ProposalId::new(1, 1));
        assert!(ProposalId::new(1, 1) < ProposalId::new(1, 2));
        assert_eq!(ProposalId::new(2, 3), ProposalId::new(2, 3));
    }

    #[test]
    fn test_propose_survives_bincode() {
        let msg = WireMessage::Propose(Proposal {
            id: ProposalId::new(0, 1),
            message_start: 1,
            messages: vec![b"A".to_vec(), b"B".to_vec()],
        });

        let bytes = msg.serialize().unwrap();
        let decoded = WireMessage::deserialize(&bytes).unwrap();

        assert_eq!(decoded, msg);
        assert_eq!(decoded.proposal_id(), Some(ProposalId::new(0, 1)));
        assert_eq!(decoded.kind(), "propose");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(WireMessage::deserialize(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }

    #[test]
    fn test_message_end() {
        let proposal = Proposal {
            id: ProposalId::new(0, 1),
            message_start: 4,
            messages: vec![vec![1], vec![2], vec![3]],
        };
        assert_eq!(proposal.message_end(), 7);
    }
}
