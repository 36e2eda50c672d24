use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Stable index of a process in the membership.
pub type ProcessId = u32;

/// Liveness state of a process.
///
/// The only transitions are `Uninitialized -> Correct` and `Correct -> Failed`.
/// `Failed` is terminal (fail-stop, no recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    /// Nothing heard from the process yet.
    Uninitialized,
    /// Process is connected and considered alive.
    Correct,
    /// Process has been detected as crashed.
    Failed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Uninitialized => "UNINITIALIZED",
            ProcessState::Correct => "CORRECT",
            ProcessState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One member of the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    id: ProcessId,
    address: SocketAddr,
    is_self: bool,
    state: ProcessState,
}

impl ProcessRecord {
    /// Create a record. The local process starts `Correct`, every other one
    /// starts `Uninitialized`.
    pub fn new(id: ProcessId, address: SocketAddr, is_self: bool) -> Self {
        let state = if is_self {
            ProcessState::Correct
        } else {
            ProcessState::Uninitialized
        };
        ProcessRecord {
            id,
            address,
            is_self,
            state,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_correct(&self) -> bool {
        self.state == ProcessState::Correct
    }

    pub fn is_failed(&self) -> bool {
        self.state == ProcessState::Failed
    }

    /// `Uninitialized -> Correct`. Returns false if the transition does not apply.
    pub(crate) fn mark_connected(&mut self) -> bool {
        if self.state == ProcessState::Uninitialized {
            self.state = ProcessState::Correct;
            true
        } else {
            false
        }
    }

    /// `Correct -> Failed`. Returns false if the transition does not apply.
    pub(crate) fn mark_failed(&mut self) -> bool {
        if self.state == ProcessState::Correct {
            self.state = ProcessState::Failed;
            true
        } else {
            false
        }
    }
}
