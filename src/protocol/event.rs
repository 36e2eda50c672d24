use crate::membership::ProcessId;

use super::message::Epoch;

/// Liveness transitions raised by the failure detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    /// First heartbeat seen from the process.
    ProcessConnected(ProcessId),
    /// The process timed out or became unreachable. Never revoked.
    FailureDetected(ProcessId),
    /// Every member is `Correct`. Raised at most once.
    AllProcessesReady,
}

/// Leadership notifications raised by the election stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionEvent {
    /// First leader, raised once at startup.
    LeaderInit { leader: ProcessId, epoch: Epoch },
    /// The incumbent failed and a new leader was chosen.
    LeaderChanged { leader: ProcessId, epoch: Epoch },
}

impl ElectionEvent {
    pub fn leader(&self) -> ProcessId {
        match self {
            ElectionEvent::LeaderInit { leader, .. } | ElectionEvent::LeaderChanged { leader, .. } => *leader,
        }
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            ElectionEvent::LeaderInit { epoch, .. } | ElectionEvent::LeaderChanged { epoch, .. } => *epoch,
        }
    }
}
