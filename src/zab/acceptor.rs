//! Replica side of the pipeline: vote on proposals, hold the accepted batch
//! until its commit arrives.

use tracing::{debug, warn};

use crate::protocol::{Epoch, Proposal, ProposalId};

/// Answer to a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Accept(ProposalId),
    Deny(ProposalId),
}

/// Votes on proposals and holds the one accepted batch until it commits.
///
/// A proposal is accepted only if it carries the current epoch and a serial
/// above the last one accepted in that epoch, which makes redelivered
/// proposals harmless.
pub struct Acceptor {
    /// Epoch of the leader currently followed.
    epoch: Epoch,
    /// Serial of the last proposal accepted in `epoch`. 0 before any.
    last_accepted_serial: u32,
    /// Last accepted batch, waiting for its commit. A newer accept replaces it.
    cached: Option<Proposal>,
}

impl Acceptor {
    pub fn new() -> Self {
        Acceptor {
            epoch: 0,
            last_accepted_serial: 0,
            cached: None,
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn last_accepted_serial(&self) -> u32 {
        self.last_accepted_serial
    }

    pub fn cached(&self) -> Option<&Proposal> {
        self.cached.as_ref()
    }

    /// Move to a new epoch. Serials restart at 1 under the new leader.
    ///
    /// The cached batch is kept: a commit for it sent by the old leader
    /// before it crashed may still be in flight.
    pub fn enter_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
        self.last_accepted_serial = 0;
    }

    /// Vote on `proposal`, caching it when accepted.
    ///
    /// # Arguments
    /// * `proposal` - Batch broadcast by the leader
    ///
    /// # Returns
    /// `Vote::Deny` for another epoch or a serial at or below the last one
    /// accepted; the cache is left untouched in that case.
    pub fn on_propose(&mut self, proposal: Proposal) -> Vote {
        let id = proposal.id;
        if id.epoch != self.epoch {
            warn!(proposal = %id, epoch = self.epoch, "denying proposal from another epoch");
            return Vote::Deny(id);
        }
        if id.serial <= self.last_accepted_serial {
            debug!(proposal = %id, last = self.last_accepted_serial, "denying stale or duplicate proposal");
            return Vote::Deny(id);
        }

        self.last_accepted_serial = id.serial;
        self.cached = Some(proposal);
        Vote::Accept(id)
    }

    /// Hand out the cached batch if `id` names it.
    pub fn take_committed(&mut self, id: ProposalId) -> Option<Proposal> {
        match &self.cached {
            Some(cached) if cached.id == id => self.cached.take(),
            Some(cached) => {
                debug!(commit = %id, cached = %cached.id, "commit does not match cached proposal");
                None
            }
            None => {
                debug!(commit = %id, "commit with nothing cached");
                None
            }
        }
    }
}

impl Default for Acceptor {
    fn default() -> Self {
        Self::new()
    }
}
