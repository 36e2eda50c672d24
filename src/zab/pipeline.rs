//! Propose / accept / commit, as seen from one replica.
//!
//! The pipeline is a pure state machine: every input returns the actions the
//! channel has to carry out. It plays both roles. As the leader it batches
//! submissions and counts accepts; as a replica it votes and delivers.

use tracing::{debug, error, info, warn};

use crate::membership::{MembershipView, ProcessId};
use crate::protocol::{ElectionEvent, Epoch, Payload, Proposal, ProposalId, WireMessage};

use super::acceptor::{Acceptor, Vote};
use super::proposer::Proposer;

/// Work produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineAction {
    /// Best-effort broadcast, self included.
    Broadcast(WireMessage),
    /// Point-to-point send. `to` may be this process.
    Send { to: ProcessId, message: WireMessage },
    /// Hand one message to the application in total order.
    Deliver { serial: u64, payload: Payload },
}

/// Both roles of the total-order broadcast for one replica.
///
/// Every replica runs an [`Acceptor`]; only the current leader's [`Proposer`]
/// produces proposals. Submissions at a follower are redirected to the leader.
pub struct ZabPipeline {
    self_id: ProcessId,
    /// Snapshot used for quorum size. Replaced by newer generations only.
    view: MembershipView,
    /// `None` until the first `LeaderInit`.
    leader: Option<ProcessId>,
    epoch: Epoch,
    acceptor: Acceptor,
    /// Holds submissions made before a leader is known, on every replica.
    proposer: Proposer,
    /// Highest serial handed to the application. 0 before any.
    last_delivered: u64,
}

impl ZabPipeline {
    pub fn new(view: MembershipView) -> Self {
        ZabPipeline {
            self_id: view.self_id(),
            view,
            leader: None,
            epoch: 0,
            acceptor: Acceptor::new(),
            proposer: Proposer::new(),
            last_delivered: 0,
        }
    }

    pub fn leader(&self) -> Option<ProcessId> {
        self.leader
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_leader(&self) -> bool {
        self.leader == Some(self.self_id)
    }

    pub fn last_delivered(&self) -> u64 {
        self.last_delivered
    }

    pub fn acceptor(&self) -> &Acceptor {
        &self.acceptor
    }

    pub fn proposer(&self) -> &Proposer {
        &self.proposer
    }

    pub fn on_view(&mut self, snapshot: &MembershipView) {
        if snapshot.generation() >= self.view.generation() {
            self.view = snapshot.clone();
        }
    }

    pub fn on_election(&mut self, event: ElectionEvent) -> Vec<PipelineAction> {
        match event {
            ElectionEvent::LeaderInit { leader, epoch } => {
                self.leader = Some(leader);
                self.epoch = epoch;
                self.acceptor.enter_epoch(epoch);
            }
            ElectionEvent::LeaderChanged { leader, epoch } => {
                if epoch != self.epoch + 1 {
                    error!(epoch, current = self.epoch, "leader change skipped or repeated an epoch");
                }
                self.leader = Some(leader);
                self.epoch = epoch;
                self.acceptor.enter_epoch(epoch);
                self.proposer.enter_epoch(self.last_delivered);
            }
        }
        debug!(leader = event.leader(), epoch = event.epoch(), "pipeline following new leader");

        // Submissions buffered while no leader was known.
        if self.is_leader() {
            self.try_propose().into_iter().collect()
        } else {
            let held = self.proposer.drain_pending();
            self.forward(held).into_iter().collect()
        }
    }

    /// Client submission at this replica.
    pub fn submit(&mut self, messages: Vec<Payload>) -> Vec<PipelineAction> {
        if messages.is_empty() {
            return Vec::new();
        }
        match self.leader {
            None => {
                debug!(count = messages.len(), "no leader yet, holding submission");
                self.proposer.enqueue(messages);
                Vec::new()
            }
            Some(leader) if leader == self.self_id => {
                self.proposer.enqueue(messages);
                self.try_propose().into_iter().collect()
            }
            Some(_) => self.forward(messages).into_iter().collect(),
        }
    }

    /// Messages forwarded by a replica that is not the leader.
    pub fn on_redirect(&mut self, from: ProcessId, messages: Vec<Payload>) -> Vec<PipelineAction> {
        if !self.is_leader() {
            warn!(from, count = messages.len(), leader = ?self.leader, "dropping redirect, not the leader");
            return Vec::new();
        }
        self.proposer.enqueue(messages);
        self.try_propose().into_iter().collect()
    }

    pub fn on_propose(&mut self, from: ProcessId, proposal: Proposal) -> Vec<PipelineAction> {
        let message = match self.acceptor.on_propose(proposal) {
            Vote::Accept(id) => WireMessage::Accept(id),
            Vote::Deny(id) => WireMessage::Deny(id),
        };
        vec![PipelineAction::Send { to: from, message }]
    }

    pub fn on_accept(&mut self, from: ProcessId, id: ProposalId) -> Vec<PipelineAction> {
        if !self.is_leader() || id.epoch != self.epoch {
            debug!(from, proposal = %id, "ignoring accept");
            return Vec::new();
        }
        let correct = self.view.correct_count();
        let mut actions = Vec::new();
        if let Some(committed) = self.proposer.on_accept(id, from, correct) {
            info!(proposal = %committed, "proposal reached quorum");
            actions.push(PipelineAction::Broadcast(WireMessage::Commit(committed)));
            actions.extend(self.try_propose());
        }
        actions
    }

    /// Denies are only logged. The proposal stays in flight and is not
    /// retried, so later submissions at this leader wait behind it.
    pub fn on_deny(&mut self, from: ProcessId, id: ProposalId) -> Vec<PipelineAction> {
        warn!(from, proposal = %id, in_flight = ?self.proposer.in_flight(), "proposal denied");
        Vec::new()
    }

    /// Deliver the cached batch named by `id`.
    ///
    /// Serials at or below [`last_delivered`](Self::last_delivered) are never
    /// handed out again. A batch overlapping them only happens after a
    /// failover where this replica saw a commit the new leader missed; the
    /// overlap is logged and skipped, the rest of the batch is delivered.
    pub fn on_commit(&mut self, id: ProposalId) -> Vec<PipelineAction> {
        let Some(proposal) = self.acceptor.take_committed(id) else {
            return Vec::new();
        };

        let last_delivered = self.last_delivered;
        let expected = last_delivered + 1;
        let end = proposal.message_end();
        if proposal.message_start < expected {
            error!(
                proposal = %id,
                start = proposal.message_start,
                last_delivered,
                skipped = end.min(expected) - proposal.message_start,
                "committed batch overlaps serials already delivered"
            );
        } else if proposal.message_start > expected {
            warn!(
                proposal = %id,
                start = proposal.message_start,
                expected,
                "committed batch skips serials"
            );
        }

        let start = proposal.message_start;
        let actions: Vec<PipelineAction> = proposal
            .messages
            .into_iter()
            .enumerate()
            .map(|(k, payload)| (start + k as u64, payload))
            .filter(|&(serial, _)| serial > last_delivered)
            .map(|(serial, payload)| PipelineAction::Deliver { serial, payload })
            .collect();
        if end > expected {
            self.last_delivered = end - 1;
            self.proposer.observe_delivered(self.last_delivered);
        }
        actions
    }

    fn try_propose(&mut self) -> Option<PipelineAction> {
        self.proposer
            .next_proposal(self.epoch)
            .map(|proposal| PipelineAction::Broadcast(WireMessage::Propose(proposal)))
    }

    fn forward(&self, messages: Vec<Payload>) -> Option<PipelineAction> {
        let leader = self.leader?;
        if messages.is_empty() {
            return None;
        }
        Some(PipelineAction::Send {
            to: leader,
            message: WireMessage::Redirect(messages),
        })
    }
}
