//! Leader side of the pipeline: batch pending submissions into proposals, one
//! in flight at a time, and decide when a proposal may commit.

use std::collections::VecDeque;

use tracing::debug;

use crate::membership::ProcessId;
use crate::protocol::{Epoch, Payload, Proposal, ProposalId};

use super::quorum::VoteTally;

/// Leader-side proposal state.
///
/// At most one proposal is in flight. Everything submitted meanwhile waits in
/// `pending` and goes out as a single batch once the in-flight one commits.
pub struct Proposer {
    /// Submissions not yet part of a proposal, in arrival order.
    pending: VecDeque<Payload>,
    /// Serial for the next proposal in the current epoch. Restarts at 1.
    next_serial: u32,
    /// Delivery serial of the first message of the next batch.
    next_message_start: u64,
    /// Present while a proposal awaits its commit.
    in_flight: Option<VoteTally>,
}

impl Proposer {
    pub fn new() -> Self {
        Proposer {
            pending: VecDeque::new(),
            next_serial: 1,
            next_message_start: 1,
            in_flight: None,
        }
    }

    pub fn enqueue(&mut self, messages: impl IntoIterator<Item = Payload>) {
        self.pending.extend(messages);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<ProposalId> {
        self.in_flight.as_ref().map(VoteTally::proposal)
    }

    pub fn next_message_start(&self) -> u64 {
        self.next_message_start
    }

    /// Hand over everything pending, used when this process is not the one
    /// that will propose it.
    pub fn drain_pending(&mut self) -> Vec<Payload> {
        self.pending.drain(..).collect()
    }

    /// Batch every pending message into the next proposal, unless one is
    /// already in flight or nothing is pending.
    pub fn next_proposal(&mut self, epoch: Epoch) -> Option<Proposal> {
        if self.has_in_flight() || self.pending.is_empty() {
            return None;
        }

        let messages: Vec<Payload> = self.pending.drain(..).collect();
        let proposal = Proposal {
            id: ProposalId::new(epoch, self.next_serial),
            message_start: self.next_message_start,
            messages,
        };
        self.next_serial += 1;
        self.next_message_start += proposal.messages.len() as u64;
        self.in_flight = Some(VoteTally::new(proposal.id));

        debug!(
            proposal = %proposal.id,
            start = proposal.message_start,
            count = proposal.messages.len(),
            "proposing batch"
        );
        Some(proposal)
    }

    /// Count an Accept. Returns the proposal id once it has a majority of the
    /// `correct_count` members, at which point nothing is in flight any more.
    ///
    /// # Arguments
    /// * `id` - Proposal the voter accepted; ignored unless it is the one in flight
    /// * `voter` - Accepting process, counted once however often it repeats
    /// * `correct_count` - Members currently `Correct` in the local view
    pub fn on_accept(&mut self, id: ProposalId, voter: ProcessId, correct_count: usize) -> Option<ProposalId> {
        let tally = self.in_flight.as_mut()?;
        if !tally.record(id, voter) {
            return None;
        }
        if tally.has_quorum(correct_count) {
            self.in_flight = None;
            Some(id)
        } else {
            None
        }
    }

    /// Fresh leader state for a new epoch. Numbering continues after the last
    /// message delivered locally.
    pub fn enter_epoch(&mut self, last_delivered: u64) {
        self.next_serial = 1;
        self.in_flight = None;
        self.observe_delivered(last_delivered);
    }

    /// Never number a batch at or below a serial already delivered here. A
    /// commit from the previous leader can land after the epoch change.
    pub fn observe_delivered(&mut self, last_delivered: u64) {
        self.next_message_start = self.next_message_start.max(last_delivered + 1);
    }
}

impl Default for Proposer {
    fn default() -> Self {
        Self::new()
    }
}
