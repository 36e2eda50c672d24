//! The group channel: one replica's protocol stack on one event loop.
//!
//! ```text
//!   transport ──► failure detector ──► broadcast / election ──► zab ──► listener
//!                        ▲                                       │
//!                        └──────── heartbeat alarm, loopback ◄───┘
//! ```
//!
//! Everything runs on a single thread. Events a stage raises for the channel
//! itself (membership changes, leadership changes, messages addressed to self)
//! go on a local queue that is drained completely before the next transport
//! event is taken. A replica therefore sees its own follow-up events in the
//! order they were raised.
//!
//! Tests drive the loop by hand with the `*_at(now)` methods and a virtual
//! clock; a server calls [`GroupChannel::run`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver};
use tracing::{debug, info, trace, warn};

use crate::config::CommConfig;
use crate::error::{CommError, TransportError};
use crate::membership::{MembershipView, ProcessId};
use crate::protocol::{ElectionEvent, Epoch, MembershipEvent, Payload, WireMessage};
use crate::stages::{BestEffortBroadcast, FailureDetector, LeaderElection};
use crate::transport::{Transport, TransportEvent};
use crate::zab::{PipelineAction, ZabPipeline};

pub mod handle;
pub mod listener;

#[cfg(test)]
mod tests;

pub use handle::{ChannelHandle, Command};
pub use listener::CommListener;

/// Work queued for this replica by itself.
#[derive(Debug)]
enum LocalEvent {
    Received { from: ProcessId, message: WireMessage },
    Undeliverable(ProcessId),
    Membership(MembershipEvent),
    Election(ElectionEvent),
    HeartbeatAlarm,
}

/// One replica's protocol stack, driven from a single thread.
///
/// The failure detector owns the authoritative membership view; broadcast,
/// election and the pipeline receive snapshots of it after every membership
/// event.
pub struct GroupChannel<T: Transport, L: CommListener> {
    self_id: ProcessId,
    /// Heartbeat period P.
    period: Duration,
    detector: FailureDetector,
    broadcast: BestEffortBroadcast,
    election: LeaderElection,
    pipeline: ZabPipeline,
    transport: T,
    /// Application callbacks, invoked on the channel's thread.
    listener: L,
    /// Follow-up events raised while handling the current one.
    local: VecDeque<LocalEvent>,
    /// Clock of the event being handled.
    now: Instant,
    /// When the heartbeat alarm fires next. `None` until started.
    next_heartbeat: Option<Instant>,
}

impl<T: Transport, L: CommListener> GroupChannel<T, L> {
    /// Build a channel. Nothing is sent until [`start`](Self::start).
    ///
    /// # Arguments
    /// * `view` - Group membership, all members `Uninitialized` except self
    /// * `config` - Heartbeat period and timeout, validated here
    /// * `transport` - Must send as `view.self_id()`
    /// * `listener` - Receives deliveries and membership notifications
    pub fn new(view: MembershipView, config: &CommConfig, transport: T, listener: L) -> Result<Self, CommError> {
        config.validate()?;
        if transport.local_id() != view.self_id() {
            return Err(CommError::membership(format!(
                "transport sends as {} but the view's self is {}",
                transport.local_id(),
                view.self_id()
            )));
        }

        let now = Instant::now();
        Ok(GroupChannel {
            self_id: view.self_id(),
            period: config.heartbeat_period,
            detector: FailureDetector::new(view.clone(), config, now),
            broadcast: BestEffortBroadcast::new(view.clone()),
            election: LeaderElection::new(view.clone()),
            pipeline: ZabPipeline::new(view),
            transport,
            listener,
            local: VecDeque::new(),
            now,
            next_heartbeat: None,
        })
    }

    pub fn self_id(&self) -> ProcessId {
        self.self_id
    }

    pub fn view(&self) -> &MembershipView {
        self.detector.view()
    }

    pub fn leader(&self) -> Option<ProcessId> {
        self.election.leader()
    }

    pub fn epoch(&self) -> Epoch {
        self.election.epoch()
    }

    pub fn is_leader(&self) -> bool {
        self.election.is_leader()
    }

    pub fn is_started(&self) -> bool {
        self.next_heartbeat.is_some()
    }

    pub fn pipeline(&self) -> &ZabPipeline {
        &self.pipeline
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Send the first heartbeats and arm the heartbeat alarm.
    pub fn start_at(&mut self, now: Instant) {
        if self.is_started() {
            return;
        }
        self.now = now;
        self.detector.reset_clock(now);
        info!(process_id = self.self_id, members = self.detector.view().len(), "channel started");

        self.send_heartbeats();
        self.next_heartbeat = Some(now + self.period);
        for event in self.detector.start() {
            self.local.push_back(LocalEvent::Membership(event));
        }
        self.drain_local();
    }

    /// Submit application messages for total-order delivery.
    pub fn submit(&mut self, messages: Vec<Payload>) {
        let actions = self.pipeline.submit(messages);
        self.apply(actions);
        self.drain_local();
    }

    /// Send an unordered message to one member.
    pub fn send_p2p(&mut self, to: ProcessId, payload: Payload) {
        self.send(to, WireMessage::P2p(payload));
        self.drain_local();
    }

    pub fn process_one(&mut self) -> bool {
        self.process_one_at(Instant::now())
    }

    /// Handle one transport event and everything it causes locally.
    ///
    /// Returns true if an event was handled.
    pub fn process_one_at(&mut self, now: Instant) -> bool {
        match self.transport.inbound().try_recv() {
            Ok(event) => {
                self.now = now;
                self.on_transport_event(event);
                true
            }
            Err(_) => false,
        }
    }

    pub fn process_all(&mut self) -> usize {
        self.process_all_at(Instant::now())
    }

    pub fn process_all_at(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        while self.process_one_at(now) {
            handled += 1;
        }
        handled
    }

    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    /// Fire the heartbeat alarm if it is due.
    ///
    /// Returns true if it fired.
    pub fn tick_at(&mut self, now: Instant) -> bool {
        match self.next_heartbeat {
            Some(due) if now >= due => {
                self.now = now;
                self.local.push_back(LocalEvent::HeartbeatAlarm);
                self.drain_local();
                true
            }
            _ => false,
        }
    }

    /// Event loop for a server. Returns on [`Command::Shutdown`] or when every
    /// handle has been dropped.
    pub fn run(&mut self, commands: Receiver<Command>) -> Result<(), CommError> {
        self.start();
        let inbound = self.transport.inbound().clone();

        loop {
            let wait = self
                .next_heartbeat
                .map(|due| due.saturating_duration_since(Instant::now()))
                .unwrap_or(self.period);

            select! {
                recv(inbound) -> event => match event {
                    Ok(event) => {
                        self.now = Instant::now();
                        self.on_transport_event(event);
                    }
                    Err(_) => return Err(CommError::ChannelClosed),
                },
                recv(commands) -> command => match command {
                    Ok(Command::Submit(messages)) => self.submit(messages),
                    Ok(Command::SendP2p { to, payload }) => self.send_p2p(to, payload),
                    Ok(Command::Shutdown) | Err(_) => {
                        info!(process_id = self.self_id, "channel shutting down");
                        return Ok(());
                    }
                },
                default(wait) => {}
            }

            self.tick_at(Instant::now());
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Received { from, message } => self.on_message(from, message),
            TransportEvent::Undeliverable { to } => self.on_undeliverable(to),
        }
        self.drain_local();
    }

    fn drain_local(&mut self) {
        while let Some(event) = self.local.pop_front() {
            match event {
                LocalEvent::Received { from, message } => self.on_message(from, message),
                LocalEvent::Undeliverable(to) => self.on_undeliverable(to),
                LocalEvent::Membership(event) => self.on_membership(event),
                LocalEvent::Election(event) => self.on_election(event),
                LocalEvent::HeartbeatAlarm => self.on_heartbeat_alarm(),
            }
        }
    }

    fn on_message(&mut self, from: ProcessId, message: WireMessage) {
        trace!(from, kind = message.kind(), proposal = ?message.proposal_id(), "received");
        let actions = match message {
            WireMessage::Heartbeat => {
                for event in self.detector.on_heartbeat(from, self.now) {
                    self.local.push_back(LocalEvent::Membership(event));
                }
                return;
            }
            WireMessage::P2p(payload) => {
                self.listener.on_receive_p2p_message(from, payload);
                return;
            }
            WireMessage::Propose(proposal) => self.pipeline.on_propose(from, proposal),
            WireMessage::Accept(id) => self.pipeline.on_accept(from, id),
            WireMessage::Deny(id) => self.pipeline.on_deny(from, id),
            WireMessage::Commit(id) => self.pipeline.on_commit(id),
            WireMessage::Redirect(messages) => self.pipeline.on_redirect(from, messages),
        };
        self.apply(actions);
    }

    fn on_undeliverable(&mut self, to: ProcessId) {
        if let Some(event) = self.detector.on_undeliverable(to) {
            self.local.push_back(LocalEvent::Membership(event));
        }
    }

    fn on_membership(&mut self, event: MembershipEvent) {
        let snapshot = self.detector.snapshot();
        self.broadcast.on_view(snapshot.clone());
        self.pipeline.on_view(&snapshot);
        if let Some(election) = self.election.on_membership(&event, &snapshot) {
            self.local.push_back(LocalEvent::Election(election));
        }

        match event {
            MembershipEvent::ProcessConnected(_) => {}
            MembershipEvent::FailureDetected(id) => self.listener.on_process_failed(id),
            MembershipEvent::AllProcessesReady => {
                info!(process_id = self.self_id, "all processes ready");
                self.listener.on_all_processes_ready();
            }
        }
    }

    fn on_election(&mut self, event: ElectionEvent) {
        let actions = self.pipeline.on_election(event);
        self.apply(actions);
    }

    fn on_heartbeat_alarm(&mut self) {
        for event in self.detector.check_timeouts(self.now) {
            self.local.push_back(LocalEvent::Membership(event));
        }
        self.send_heartbeats();
        self.next_heartbeat = Some(self.now + self.period);
    }

    fn send_heartbeats(&mut self) {
        for to in self.detector.heartbeat_targets() {
            self.send(to, WireMessage::Heartbeat);
        }
    }

    fn apply(&mut self, actions: Vec<PipelineAction>) {
        for action in actions {
            match action {
                PipelineAction::Broadcast(message) => {
                    let fanout = self.broadcast.fanout();
                    for to in fanout.remote {
                        self.send(to, message.clone());
                    }
                    self.local.push_back(LocalEvent::Received {
                        from: fanout.loopback,
                        message,
                    });
                }
                PipelineAction::Send { to, message } => self.send(to, message),
                PipelineAction::Deliver { serial, payload } => {
                    debug!(serial, len = payload.len(), "delivering");
                    self.listener.on_receive_total_order_message(serial, payload);
                }
            }
        }
    }

    fn send(&mut self, to: ProcessId, message: WireMessage) {
        if to == self.self_id {
            self.local.push_back(LocalEvent::Received { from: to, message });
            return;
        }
        match self.transport.send_to(to, message) {
            Ok(()) => {}
            Err(TransportError::Undeliverable(id)) => self.local.push_back(LocalEvent::Undeliverable(id)),
            Err(e) => warn!(to, error = %e, "send failed"),
        }
    }
}
