//! Accept vote counting for the in-flight proposal.
//!
//! Voters are kept in a fixed-size bitset so a replica that answers twice is
//! only counted once.

use crate::membership::{ProcessId, MAX_MEMBERS};
use crate::protocol::ProposalId;

/// One bit per process id.
///
/// # Performance
/// `insert`, `contains` and `count` are single bit operations on a `u64`, so
/// tallying a vote costs the same in a group of 3 or of 64.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoterSet(u64);

impl VoterSet {
    #[inline]
    pub fn new() -> Self {
        VoterSet(0)
    }

    /// Set the bit for `id`. Returns false if it was already set.
    #[inline]
    pub fn insert(&mut self, id: ProcessId) -> bool {
        debug_assert!((id as usize) < MAX_MEMBERS, "process id exceeds MAX_MEMBERS");
        let bit = 1u64 << id;
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    #[inline]
    pub fn contains(&self, id: ProcessId) -> bool {
        debug_assert!((id as usize) < MAX_MEMBERS, "process id exceeds MAX_MEMBERS");
        self.0 & (1u64 << id) != 0
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }
}

/// Accepts collected for one proposal.
#[derive(Debug, Clone)]
pub struct VoteTally {
    proposal: ProposalId,
    voters: VoterSet,
}

impl VoteTally {
    pub fn new(proposal: ProposalId) -> Self {
        VoteTally {
            proposal,
            voters: VoterSet::new(),
        }
    }

    pub fn proposal(&self) -> ProposalId {
        self.proposal
    }

    /// Count an Accept. Votes for another proposal and repeats are ignored.
    pub fn record(&mut self, proposal: ProposalId, voter: ProcessId) -> bool {
        proposal == self.proposal && self.voters.insert(voter)
    }

    pub fn votes(&self) -> usize {
        self.voters.count()
    }

    /// Strict majority of the members currently `Correct`.
    pub fn has_quorum(&self, correct_count: usize) -> bool {
        self.votes() * 2 > correct_count
    }
}
