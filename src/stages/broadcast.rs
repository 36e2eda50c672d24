//! Best-effort broadcast.
//!
//! A broadcast goes to every member currently `Correct` other than the sender
//! and is looped back to the sender without a network hop. No ordering across
//! senders and no guarantee that a crashing destination got its copy.

use crate::membership::{MembershipView, ProcessId};

/// Where one broadcast has to go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fanout {
    /// Remote destinations, in id order.
    pub remote: Vec<ProcessId>,
    /// The sender itself, served by local loopback.
    pub loopback: ProcessId,
}

pub struct BestEffortBroadcast {
    view: MembershipView,
}

impl BestEffortBroadcast {
    pub fn new(view: MembershipView) -> Self {
        BestEffortBroadcast { view }
    }

    /// Replace the local copy with a newer snapshot.
    pub fn on_view(&mut self, snapshot: MembershipView) {
        if snapshot.generation() >= self.view.generation() {
            self.view = snapshot;
        }
    }

    pub fn fanout(&self) -> Fanout {
        let self_id = self.view.self_id();
        let remote = self.view.correct_ids().into_iter().filter(|&id| id != self_id).collect();
        Fanout {
            remote,
            loopback: self_id,
        }
    }
}
