//! In-process cluster driven on a virtual clock.
//!
//! All replicas share one thread. The runner delivers queued messages until
//! the cluster is quiet, and moves time forward explicitly so heartbeat
//! timeouts are reproducible.

use std::time::{Duration, Instant};

use tracing::warn;

use crate::channel::{CommListener, GroupChannel};
use crate::config::CommConfig;
use crate::error::CommError;
use crate::membership::{MembershipView, ProcessId};
use crate::protocol::{Epoch, Payload};
use crate::transport::{ChaosConfig, MockEndpoint, MockNetwork};

use super::checker::DeliveryHistory;

/// Upper bound on delivery rounds in one [`Cluster::settle`].
const MAX_SETTLE_ROUNDS: usize = 10_000;

/// Base port for the (never bound) member addresses.
const BASE_PORT: u16 = 9000;

/// Listener that keeps everything it is told.
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub deliveries: Vec<(u64, Payload)>,
    pub failed: Vec<ProcessId>,
    pub p2p: Vec<(ProcessId, Payload)>,
    pub ready: bool,
}

impl CommListener for RecordingListener {
    fn on_all_processes_ready(&mut self) {
        self.ready = true;
    }

    fn on_process_failed(&mut self, id: ProcessId) {
        self.failed.push(id);
    }

    fn on_receive_p2p_message(&mut self, from: ProcessId, payload: Payload) {
        self.p2p.push((from, payload));
    }

    fn on_receive_total_order_message(&mut self, serial: u64, payload: Payload) {
        self.deliveries.push((serial, payload));
    }
}

pub type Replica = GroupChannel<MockEndpoint, RecordingListener>;

pub struct Cluster {
    network: MockNetwork,
    replicas: Vec<Replica>,
    crashed: Vec<bool>,
    config: CommConfig,
    now: Instant,
}

impl Cluster {
    pub fn new(size: usize, config: CommConfig) -> Result<Self, CommError> {
        Self::with_chaos(size, config, ChaosConfig::default())
    }

    pub fn with_chaos(size: usize, config: CommConfig, chaos: ChaosConfig) -> Result<Self, CommError> {
        let mut network = MockNetwork::with_chaos(size, chaos);
        let mut replicas = Vec::with_capacity(size);
        for id in 0..size as ProcessId {
            let view = MembershipView::loopback(size, id, BASE_PORT)?;
            let endpoint = network
                .endpoint(id)
                .ok_or_else(|| CommError::membership(format!("no endpoint for {}", id)))?;
            replicas.push(GroupChannel::new(view, &config, endpoint, RecordingListener::default())?);
        }

        Ok(Cluster {
            network,
            replicas,
            crashed: vec![false; size],
            config,
            now: Instant::now(),
        })
    }

    /// Start every replica and let the group form.
    pub fn start(&mut self) {
        let now = self.now;
        for replica in &mut self.replicas {
            replica.start_at(now);
        }
        self.settle();
    }

    pub fn size(&self) -> usize {
        self.replicas.len()
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn config(&self) -> &CommConfig {
        &self.config
    }

    pub fn network(&self) -> &MockNetwork {
        &self.network
    }

    pub fn replica(&self, id: ProcessId) -> &Replica {
        &self.replicas[id as usize]
    }

    pub fn is_crashed(&self, id: ProcessId) -> bool {
        self.crashed[id as usize]
    }

    pub fn live_ids(&self) -> Vec<ProcessId> {
        (0..self.size() as ProcessId).filter(|&id| !self.is_crashed(id)).collect()
    }

    /// Deliver queued traffic until no live replica has anything left.
    ///
    /// Returns the number of transport events handled.
    pub fn settle(&mut self) -> usize {
        let now = self.now;
        let mut total = 0;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let mut handled = 0;
            for (id, replica) in self.replicas.iter_mut().enumerate() {
                if !self.crashed[id] {
                    handled += replica.process_all_at(now);
                }
            }
            if handled == 0 {
                return total;
            }
            total += handled;
        }
        warn!(rounds = MAX_SETTLE_ROUNDS, "cluster did not settle");
        total
    }

    /// Move the clock forward, fire due alarms and settle.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        let now = self.now;
        for (id, replica) in self.replicas.iter_mut().enumerate() {
            if !self.crashed[id] {
                replica.tick_at(now);
            }
        }
        self.settle();
    }

    /// Advance one heartbeat period at a time until `total` has passed.
    pub fn run_for(&mut self, total: Duration) {
        let step = self.config.heartbeat_period;
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            self.advance(step);
            elapsed += step;
        }
    }

    /// Fail-stop `id`. Peers find out on their next send to it.
    pub fn crash(&mut self, id: ProcessId) {
        self.network.crash(id);
        self.crashed[id as usize] = true;
    }

    /// Cut `id` off silently. Only the heartbeat timeout notices.
    pub fn isolate(&mut self, id: ProcessId) {
        self.network.isolate(id);
    }

    pub fn submit(&mut self, at: ProcessId, messages: Vec<Payload>) {
        if self.is_crashed(at) {
            return;
        }
        self.replicas[at as usize].submit(messages);
    }

    pub fn send_p2p(&mut self, from: ProcessId, to: ProcessId, payload: Payload) {
        if self.is_crashed(from) {
            return;
        }
        self.replicas[from as usize].send_p2p(to, payload);
    }

    pub fn deliveries(&self, id: ProcessId) -> &[(u64, Payload)] {
        &self.replica(id).listener().deliveries
    }

    pub fn leader_of(&self, id: ProcessId) -> Option<ProcessId> {
        self.replica(id).leader()
    }

    pub fn epoch_of(&self, id: ProcessId) -> Epoch {
        self.replica(id).epoch()
    }

    /// Deliveries of all replicas, crashed ones included.
    pub fn history(&self) -> DeliveryHistory {
        let mut history = DeliveryHistory::new(self.size());
        for (id, replica) in self.replicas.iter().enumerate() {
            for (serial, payload) in &replica.listener().deliveries {
                history.record(id as ProcessId, *serial, payload.clone());
            }
        }
        history
    }
}
