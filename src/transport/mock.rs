//! In-process network for tests.
//!
//! Every member gets a crossbeam inbox. A crashed member is unreachable: sends
//! to it fail immediately, which drives the failure detector's fast path, and
//! it sends nothing. An isolated member is silent: traffic to and from it is
//! dropped without an error, so only the heartbeat timeout notices. Random loss
//! is seeded so runs reproduce.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::TransportError;
use crate::membership::ProcessId;
use crate::protocol::WireMessage;

use super::{Transport, TransportEvent};

/// Random message loss.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Probability of dropping a message (0.0 - 1.0).
    pub drop_rate: f64,
    /// Seed for the loss decisions.
    pub seed: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            drop_rate: 0.0,
            seed: 0,
        }
    }
}

/// State shared by the network and all endpoints.
struct Fabric {
    crashed: Vec<AtomicBool>,
    isolated: Vec<AtomicBool>,
    drop_rate: f64,
    rng: Mutex<StdRng>,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl Fabric {
    fn is_crashed(&self, id: ProcessId) -> bool {
        self.crashed
            .get(id as usize)
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn is_isolated(&self, id: ProcessId) -> bool {
        self.isolated
            .get(id as usize)
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn roll_drop(&self) -> bool {
        if self.drop_rate <= 0.0 {
            return false;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_bool(self.drop_rate.min(1.0))
    }
}

/// One member's view of the mock network.
pub struct MockEndpoint {
    node_id: ProcessId,
    rx: Receiver<TransportEvent>,
    tx_map: HashMap<ProcessId, Sender<TransportEvent>>,
    fabric: Arc<Fabric>,
}

impl Transport for MockEndpoint {
    fn local_id(&self) -> ProcessId {
        self.node_id
    }

    fn send_to(&self, to: ProcessId, message: WireMessage) -> Result<(), TransportError> {
        let tx = self.tx_map.get(&to).ok_or(TransportError::UnknownProcess(to))?;

        if self.fabric.is_crashed(self.node_id) || self.fabric.is_isolated(self.node_id) {
            self.fabric.messages_dropped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        if self.fabric.is_crashed(to) {
            return Err(TransportError::Undeliverable(to));
        }
        if self.fabric.is_isolated(to) || self.fabric.roll_drop() {
            self.fabric.messages_dropped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        self.fabric.messages_sent.fetch_add(1, Ordering::SeqCst);
        tx.send(TransportEvent::Received {
            from: self.node_id,
            message,
        })
        .map_err(|_| TransportError::Undeliverable(to))
    }

    fn inbound(&self) -> &Receiver<TransportEvent> {
        &self.rx
    }
}

/// Mock network connecting `size` members.
pub struct MockNetwork {
    size: usize,
    senders: HashMap<ProcessId, Sender<TransportEvent>>,
    receivers: HashMap<ProcessId, Receiver<TransportEvent>>,
    fabric: Arc<Fabric>,
}

impl MockNetwork {
    /// Loss-free network.
    pub fn new(size: usize) -> Self {
        Self::with_chaos(size, ChaosConfig::default())
    }

    pub fn with_chaos(size: usize, chaos: ChaosConfig) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for id in 0..size as ProcessId {
            let (tx, rx) = unbounded();
            senders.insert(id, tx);
            receivers.insert(id, rx);
        }

        let fabric = Fabric {
            crashed: (0..size).map(|_| AtomicBool::new(false)).collect(),
            isolated: (0..size).map(|_| AtomicBool::new(false)).collect(),
            drop_rate: chaos.drop_rate,
            rng: Mutex::new(StdRng::seed_from_u64(chaos.seed)),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        };

        MockNetwork {
            size,
            senders,
            receivers,
            fabric: Arc::new(fabric),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Create the endpoint for `id`. Each endpoint can be taken once.
    pub fn endpoint(&mut self, id: ProcessId) -> Option<MockEndpoint> {
        let rx = self.receivers.remove(&id)?;
        let tx_map = self
            .senders
            .iter()
            .filter(|&(&peer, _)| peer != id)
            .map(|(&peer, tx)| (peer, tx.clone()))
            .collect();

        Some(MockEndpoint {
            node_id: id,
            rx,
            tx_map,
            fabric: Arc::clone(&self.fabric),
        })
    }

    /// Fail-stop `id`. Sends to it report it unreachable from now on.
    pub fn crash(&self, id: ProcessId) {
        if let Some(flag) = self.fabric.crashed.get(id as usize) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_crashed(&self, id: ProcessId) -> bool {
        self.fabric.is_crashed(id)
    }

    /// Silently drop all traffic to and from `id`.
    pub fn isolate(&self, id: ProcessId) {
        if let Some(flag) = self.fabric.isolated.get(id as usize) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn heal(&self, id: ProcessId) {
        if let Some(flag) = self.fabric.isolated.get(id as usize) {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Tell `at` that `unreachable` could not be reached, as a transport would
    /// after a failed asynchronous write.
    pub fn inject_undeliverable(&self, at: ProcessId, unreachable: ProcessId) {
        if let Some(tx) = self.senders.get(&at) {
            let _ = tx.send(TransportEvent::Undeliverable { to: unreachable });
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.fabric.messages_sent.load(Ordering::SeqCst)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.fabric.messages_dropped.load(Ordering::SeqCst)
    }
}
