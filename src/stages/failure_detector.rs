//! Heartbeat failure detector.
//!
//! Every process sends a heartbeat to every other non-failed member once per
//! period P. Receiving a heartbeat refreshes the sender's last-seen time and
//! connects it on first contact. The periodic scan fails every `Correct`
//! member silent for longer than T. A transport "unreachable" signal fails a
//! `Correct` member immediately.
//!
//! No ordering across processes: two replicas may notice the same crash at
//! different times.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::CommConfig;
use crate::membership::{MembershipView, ProcessId, ProcessState};
use crate::protocol::MembershipEvent;

/// Heartbeat bookkeeping and the authoritative membership view.
///
/// Holds no clock of its own: every time-dependent call takes `now`, so tests
/// can drive it with a virtual clock.
pub struct FailureDetector {
    /// Authoritative view. Only this stage changes process states.
    view: MembershipView,
    /// Heartbeat period P.
    period: Duration,
    /// Liveness timeout T. Silence must exceed it, not merely reach it.
    timeout: Duration,
    /// Last heartbeat time per member, indexed by process id.
    last_seen: Vec<Instant>,
    /// `AllProcessesReady` is raised at most once.
    ready_raised: bool,
}

impl FailureDetector {
    /// Create a detector. Every member counts as seen at `now`.
    pub fn new(view: MembershipView, config: &CommConfig, now: Instant) -> Self {
        let last_seen = vec![now; view.len()];
        FailureDetector {
            view,
            period: config.heartbeat_period,
            timeout: config.heartbeat_timeout,
            last_seen,
            ready_raised: false,
        }
    }

    pub fn view(&self) -> &MembershipView {
        &self.view
    }

    /// Deep copy of the current view for handing to another stage.
    pub fn snapshot(&self) -> MembershipView {
        self.view.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_seen(&self, id: ProcessId) -> Option<Instant> {
        self.last_seen.get(id as usize).copied()
    }

    /// Treat every member as seen at `now`.
    pub fn reset_clock(&mut self, now: Instant) {
        self.last_seen.iter_mut().for_each(|t| *t = now);
    }

    /// Events due at channel start. A group of one is ready immediately.
    pub fn start(&mut self) -> Vec<MembershipEvent> {
        let mut events = Vec::new();
        self.check_ready(&mut events);
        events
    }

    /// Members that should receive a heartbeat this period.
    pub fn heartbeat_targets(&self) -> Vec<ProcessId> {
        self.view
            .iter()
            .filter(|p| !p.is_self() && !p.is_failed())
            .map(|p| p.id())
            .collect()
    }

    /// Record a heartbeat from `from`.
    pub fn on_heartbeat(&mut self, from: ProcessId, now: Instant) -> Vec<MembershipEvent> {
        let mut events = Vec::new();
        let state = match self.view.state(from) {
            Some(state) => state,
            None => {
                warn!(process_id = from, "heartbeat from unknown process");
                return events;
            }
        };
        if from == self.view.self_id() {
            return events;
        }

        match state {
            ProcessState::Failed => {
                debug!(process_id = from, "ignoring heartbeat from failed process");
            }
            ProcessState::Uninitialized => {
                self.last_seen[from as usize] = now;
                self.view.mark_connected(from);
                info!(process_id = from, "process connected");
                events.push(MembershipEvent::ProcessConnected(from));
                self.check_ready(&mut events);
            }
            ProcessState::Correct => {
                self.last_seen[from as usize] = now;
            }
        }
        events
    }

    /// Transport could not reach `to`.
    pub fn on_undeliverable(&mut self, to: ProcessId) -> Option<MembershipEvent> {
        match self.view.state(to)? {
            ProcessState::Correct if to != self.view.self_id() => {
                warn!(process_id = to, "process failed: transport reports it unreachable");
                self.fail(to)
            }
            ProcessState::Uninitialized => {
                warn!(process_id = to, "cannot reach process that has not connected yet, will retry");
                None
            }
            _ => None,
        }
    }

    /// Scan for members silent longer than the timeout.
    ///
    /// # Arguments
    /// * `now` - Time of the heartbeat alarm
    ///
    /// # Returns
    /// One `FailureDetected` per newly failed member. Members that never
    /// connected are not timed out.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<MembershipEvent> {
        let self_id = self.view.self_id();
        let expired: Vec<ProcessId> = self
            .view
            .iter()
            .filter(|p| p.id() != self_id && p.is_correct())
            .filter(|p| now.saturating_duration_since(self.last_seen[p.id() as usize]) > self.timeout)
            .map(|p| p.id())
            .collect();

        let timeout = self.timeout;
        expired
            .into_iter()
            .filter_map(|id| {
                warn!(process_id = id, ?timeout, "process failed: heartbeat timeout");
                self.fail(id)
            })
            .collect()
    }

    fn fail(&mut self, id: ProcessId) -> Option<MembershipEvent> {
        if self.view.mark_failed(id) {
            Some(MembershipEvent::FailureDetected(id))
        } else {
            None
        }
    }

    fn check_ready(&mut self, events: &mut Vec<MembershipEvent>) {
        if !self.ready_raised && self.view.all_correct() {
            self.ready_raised = true;
            events.push(MembershipEvent::AllProcessesReady);
        }
    }
}
