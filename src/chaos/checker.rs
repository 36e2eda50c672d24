//! Delivery history and total-order checker.
//!
//! Verifies, over the deliveries recorded at every replica:
//! - Agreement: two replicas that delivered the same serial delivered the
//!   same payload.
//! - Order: serials strictly increase at each replica.
//!
//! Holes in a replica's sequence are counted but are not violations; a
//! failover may leave them.

use std::collections::HashMap;

use crate::membership::ProcessId;
use crate::protocol::Payload;

/// Deliveries per replica, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct DeliveryHistory {
    replicas: Vec<Vec<(u64, Payload)>>,
}

impl DeliveryHistory {
    pub fn new(size: usize) -> Self {
        DeliveryHistory {
            replicas: vec![Vec::new(); size],
        }
    }

    pub fn record(&mut self, replica: ProcessId, serial: u64, payload: Payload) {
        let index = replica as usize;
        if index >= self.replicas.len() {
            self.replicas.resize(index + 1, Vec::new());
        }
        self.replicas[index].push((serial, payload));
    }

    pub fn replica(&self, replica: ProcessId) -> &[(u64, Payload)] {
        self.replicas
            .get(replica as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn total_deliveries(&self) -> usize {
        self.replicas.iter().map(Vec::len).sum()
    }
}

/// Result of a check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub stats: CheckStats,
}

#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Two replicas delivered different payloads under one serial.
    Divergence,
    /// A replica delivered a serial not above its previous one.
    NonIncreasing,
}

#[derive(Debug, Clone, Default)]
pub struct CheckStats {
    pub total_deliveries: usize,
    /// Distinct serials delivered anywhere.
    pub distinct_serials: usize,
    /// Missing serials between consecutive deliveries, summed over replicas.
    pub holes: u64,
}

pub struct Checker;

impl Checker {
    pub fn verify(history: &DeliveryHistory) -> CheckResult {
        let mut violations = Vec::new();
        let mut stats = CheckStats {
            total_deliveries: history.total_deliveries(),
            ..CheckStats::default()
        };
        // serial -> (first replica that delivered it, payload)
        let mut agreed: HashMap<u64, (ProcessId, &Payload)> = HashMap::new();

        for replica in 0..history.replica_count() as ProcessId {
            let mut previous: Option<u64> = None;
            for (serial, payload) in history.replica(replica) {
                if let Some(prev) = previous {
                    if *serial <= prev {
                        violations.push(Violation {
                            kind: ViolationKind::NonIncreasing,
                            description: format!("replica {} delivered {} after {}", replica, serial, prev),
                        });
                    } else {
                        stats.holes += serial - prev - 1;
                    }
                }
                previous = Some(*serial);

                match agreed.get(serial) {
                    Some((first, expected)) if *expected != payload => {
                        violations.push(Violation {
                            kind: ViolationKind::Divergence,
                            description: format!(
                                "serial {} is {:?} at replica {} but {:?} at replica {}",
                                serial,
                                String::from_utf8_lossy(expected),
                                first,
                                String::from_utf8_lossy(payload),
                                replica
                            ),
                        });
                    }
                    Some(_) => {}
                    None => {
                        agreed.insert(*serial, (replica, payload));
                    }
                }
            }
        }

        stats.distinct_serials = agreed.len();
        CheckResult {
            passed: violations.is_empty(),
            violations,
            stats,
        }
    }
}
