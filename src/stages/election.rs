//! Deterministic leader election.
//!
//! Once every member is `Correct` the highest id leads epoch 0. When the
//! leader fails, the highest id still `Correct` takes over in the next epoch.
//! Every replica runs the same rule on its own view, so replicas that observe
//! the same failures pick the same leader without exchanging messages.

use tracing::info;

use crate::membership::{MembershipView, ProcessId};
use crate::protocol::{ElectionEvent, Epoch, MembershipEvent};

pub struct LeaderElection {
    view: MembershipView,
    leader: Option<ProcessId>,
    epoch: Epoch,
}

impl LeaderElection {
    pub fn new(view: MembershipView) -> Self {
        LeaderElection {
            view,
            leader: None,
            epoch: 0,
        }
    }

    /// Current leader, `None` until the group has been ready once.
    pub fn leader(&self) -> Option<ProcessId> {
        self.leader
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_leader(&self) -> bool {
        self.leader == Some(self.view.self_id())
    }

    /// React to a membership transition. `snapshot` is the view after it.
    pub fn on_membership(&mut self, event: &MembershipEvent, snapshot: &MembershipView) -> Option<ElectionEvent> {
        if snapshot.generation() >= self.view.generation() {
            self.view = snapshot.clone();
        }

        match *event {
            MembershipEvent::AllProcessesReady if self.leader.is_none() => {
                let leader = self.view.highest_id();
                self.leader = Some(leader);
                self.epoch = 0;
                info!(leader, epoch = self.epoch, "initial leader elected");
                Some(ElectionEvent::LeaderInit {
                    leader,
                    epoch: self.epoch,
                })
            }
            MembershipEvent::FailureDetected(failed) if self.leader == Some(failed) => {
                let leader = self.next_leader();
                self.leader = Some(leader);
                self.epoch += 1;
                info!(failed, leader, epoch = self.epoch, "leader failed, new leader elected");
                Some(ElectionEvent::LeaderChanged {
                    leader,
                    epoch: self.epoch,
                })
            }
            _ => None,
        }
    }

    /// Highest id still `Correct`. Self is never failed locally, so the scan
    /// always finds someone.
    fn next_leader(&self) -> ProcessId {
        (0..=self.view.highest_id())
            .rev()
            .find(|&id| self.view.is_correct(id))
            .unwrap_or_else(|| self.view.self_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_view(size: usize, self_id: ProcessId) -> MembershipView {
        let mut view = MembershipView::loopback(size, self_id, 7000).unwrap();
        for id in 0..size as ProcessId {
            view.mark_connected(id);
        }
        view
    }

    #[test]
    fn test_no_leader_before_ready() {
        let mut view = MembershipView::loopback(3, 0, 7000).unwrap();
        let mut election = LeaderElection::new(view.clone());

        view.mark_connected(1);
        assert_eq!(
            election.on_membership(&MembershipEvent::ProcessConnected(1), &view),
            None
        );
        assert_eq!(election.leader(), None);
    }

    #[test]
    fn test_failover_sequence_is_deterministic() {
        // Same inputs on every replica give the same leaders and epochs.
        for self_id in 0..3 {
            let mut view = ready_view(5, self_id);
            let mut election = LeaderElection::new(view.clone());

            assert_eq!(
                election.on_membership(&MembershipEvent::AllProcessesReady, &view),
                Some(ElectionEvent::LeaderInit { leader: 4, epoch: 0 })
            );

            view.mark_failed(4);
            assert_eq!(
                election.on_membership(&MembershipEvent::FailureDetected(4), &view),
                Some(ElectionEvent::LeaderChanged { leader: 3, epoch: 1 })
            );

            view.mark_failed(3);
            assert_eq!(
                election.on_membership(&MembershipEvent::FailureDetected(3), &view),
                Some(ElectionEvent::LeaderChanged { leader: 2, epoch: 2 })
            );
            assert_eq!(election.is_leader(), self_id == 2);
        }
    }

    #[test]
    fn test_follower_failure_keeps_leader() {
        let mut view = ready_view(3, 0);
        let mut election = LeaderElection::new(view.clone());
        election.on_membership(&MembershipEvent::AllProcessesReady, &view);

        view.mark_failed(1);
        assert_eq!(
            election.on_membership(&MembershipEvent::FailureDetected(1), &view),
            None
        );
        assert_eq!(election.leader(), Some(2));
        assert_eq!(election.epoch(), 0);
    }

    #[test]
    fn test_skips_failed_candidates() {
        let mut view = ready_view(5, 0);
        let mut election = LeaderElection::new(view.clone());
        election.on_membership(&MembershipEvent::AllProcessesReady, &view);

        // 3 failed first, while 4 still led.
        view.mark_failed(3);
        election.on_membership(&MembershipEvent::FailureDetected(3), &view);
        view.mark_failed(4);
        assert_eq!(
            election.on_membership(&MembershipEvent::FailureDetected(4), &view),
            Some(ElectionEvent::LeaderChanged { leader: 2, epoch: 1 })
        );
    }

    #[test]
    fn test_ready_raised_twice_is_ignored() {
        let view = ready_view(2, 0);
        let mut election = LeaderElection::new(view.clone());
        assert!(election.on_membership(&MembershipEvent::AllProcessesReady, &view).is_some());
        assert!(election.on_membership(&MembershipEvent::AllProcessesReady, &view).is_none());
    }
}
