use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::CommError;

use super::process::{ProcessId, ProcessRecord, ProcessState};

/// Maximum group size. Vote tallies are kept in a `u64` bitset.
pub const MAX_MEMBERS: usize = 64;

/// Ordered, index-stable snapshot of the group.
///
/// A view is a plain value: cloning it yields an independent deep copy. Every
/// stage keeps its own copy and replaces it when the failure detector hands
/// over a newer one, so no two components ever share a mutable view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipView {
    processes: Vec<ProcessRecord>,
    self_id: ProcessId,
    by_address: HashMap<SocketAddr, ProcessId>,
    /// Bumped on every state transition.
    generation: u64,
}

impl MembershipView {
    /// Build a view from member addresses in id order.
    pub fn from_addresses(addresses: &[SocketAddr], self_id: ProcessId) -> Result<Self, CommError> {
        let mut builder = MembershipViewBuilder::new();
        for addr in addresses {
            builder.add(*addr);
        }
        builder.build(self_id)
    }

    /// Group of `size` processes on consecutive localhost ports.
    pub fn loopback(size: usize, self_id: ProcessId, base_port: u16) -> Result<Self, CommError> {
        let addresses: Vec<SocketAddr> = (0..size)
            .map(|i| SocketAddr::from(([127, 0, 0, 1], base_port.wrapping_add(i as u16))))
            .collect();
        Self::from_addresses(&addresses, self_id)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn self_id(&self) -> ProcessId {
        self.self_id
    }

    pub fn self_record(&self) -> &ProcessRecord {
        &self.processes[self.self_id as usize]
    }

    pub fn get(&self, id: ProcessId) -> Option<&ProcessRecord> {
        self.processes.get(id as usize)
    }

    pub fn state(&self, id: ProcessId) -> Option<ProcessState> {
        self.get(id).map(ProcessRecord::state)
    }

    pub fn is_correct(&self, id: ProcessId) -> bool {
        self.get(id).map(ProcessRecord::is_correct).unwrap_or(false)
    }

    /// Resolve a member address to its id.
    pub fn id_of(&self, addr: &SocketAddr) -> Option<ProcessId> {
        self.by_address.get(addr).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessRecord> {
        self.processes.iter()
    }

    /// Highest id in the group.
    pub fn highest_id(&self) -> ProcessId {
        (self.processes.len() - 1) as ProcessId
    }

    pub fn correct_count(&self) -> usize {
        self.processes.iter().filter(|p| p.is_correct()).count()
    }

    pub fn correct_ids(&self) -> Vec<ProcessId> {
        self.processes
            .iter()
            .filter(|p| p.is_correct())
            .map(ProcessRecord::id)
            .collect()
    }

    pub fn all_correct(&self) -> bool {
        self.processes.iter().all(ProcessRecord::is_correct)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn mark_connected(&mut self, id: ProcessId) -> bool {
        let changed = self
            .processes
            .get_mut(id as usize)
            .map(ProcessRecord::mark_connected)
            .unwrap_or(false);
        if changed {
            self.generation += 1;
        }
        changed
    }

    pub(crate) fn mark_failed(&mut self, id: ProcessId) -> bool {
        let changed = self
            .processes
            .get_mut(id as usize)
            .map(ProcessRecord::mark_failed)
            .unwrap_or(false);
        if changed {
            self.generation += 1;
        }
        changed
    }
}

/// Collects member addresses; ids are assigned in insertion order.
#[derive(Debug, Default)]
pub struct MembershipViewBuilder {
    addresses: Vec<SocketAddr>,
}

impl MembershipViewBuilder {
    pub fn new() -> Self {
        MembershipViewBuilder::default()
    }

    /// Append a member and return the id it will get.
    pub fn add(&mut self, addr: SocketAddr) -> ProcessId {
        self.addresses.push(addr);
        (self.addresses.len() - 1) as ProcessId
    }

    pub fn build(self, self_id: ProcessId) -> Result<MembershipView, CommError> {
        if self.addresses.is_empty() {
            return Err(CommError::membership("membership is empty"));
        }
        if self.addresses.len() > MAX_MEMBERS {
            return Err(CommError::membership(format!(
                "{} members exceed the maximum of {}",
                self.addresses.len(),
                MAX_MEMBERS
            )));
        }
        if self_id as usize >= self.addresses.len() {
            return Err(CommError::membership(format!(
                "self id {} is outside a group of {}",
                self_id,
                self.addresses.len()
            )));
        }

        let mut by_address = HashMap::with_capacity(self.addresses.len());
        let mut processes = Vec::with_capacity(self.addresses.len());
        for (index, addr) in self.addresses.into_iter().enumerate() {
            let id = index as ProcessId;
            if by_address.insert(addr, id).is_some() {
                return Err(CommError::membership(format!("duplicate member address {}", addr)));
            }
            processes.push(ProcessRecord::new(id, addr, id == self_id));
        }

        Ok(MembershipView {
            processes,
            self_id,
            by_address,
            generation: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let view = MembershipView::loopback(3, 1, 7000).unwrap();

        assert_eq!(view.len(), 3);
        assert_eq!(view.self_id(), 1);
        assert!(view.self_record().is_self());
        assert_eq!(view.highest_id(), 2);
        assert_eq!(view.id_of(&SocketAddr::from(([127, 0, 0, 1], 7002))), Some(2));
        assert_eq!(view.id_of(&SocketAddr::from(([127, 0, 0, 1], 9999))), None);

        // Only self is correct until others connect.
        assert_eq!(view.correct_ids(), vec![1]);
        assert!(!view.all_correct());
    }

    #[test]
    fn test_rejects_bad_membership() {
        assert!(MembershipView::from_addresses(&[], 0).is_err());
        assert!(MembershipView::loopback(3, 3, 7000).is_err());
        assert!(MembershipView::loopback(MAX_MEMBERS + 1, 0, 7000).is_err());

        let addr = SocketAddr::from(([127, 0, 0, 1], 7000));
        assert!(MembershipView::from_addresses(&[addr, addr], 0).is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut view = MembershipView::loopback(3, 0, 7000).unwrap();
        let snapshot = view.clone();

        assert!(view.mark_connected(2));
        assert_eq!(view.generation(), 1);

        // The snapshot is untouched.
        assert_eq!(snapshot.state(2), Some(ProcessState::Uninitialized));
        assert_eq!(snapshot.generation(), 0);
        assert_eq!(view.correct_count(), 2);
    }

    #[test]
    fn test_transitions_bump_generation_only_on_change() {
        let mut view = MembershipView::loopback(2, 0, 7000).unwrap();

        assert!(!view.mark_failed(1));
        assert_eq!(view.generation(), 0);
        assert!(view.mark_connected(1));
        assert!(view.mark_failed(1));
        assert!(!view.mark_connected(1));
        assert_eq!(view.generation(), 2);
        assert!(!view.mark_connected(42));
    }
}
