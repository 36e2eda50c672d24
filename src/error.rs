//! Error types for the group communication stack.
//!
//! Only construction and I/O setup return errors. Faults that happen while the
//! event loop is running are turned into typed events (failure detection,
//! leader change, deny votes) instead of crossing component boundaries.

use std::io;
use std::net::SocketAddr;

use crate::membership::ProcessId;

/// Errors raised while building or running a replica.
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// Configuration values are inconsistent.
    #[error("invalid configuration: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// The membership view could not be built.
    #[error("invalid membership: {message}")]
    Membership {
        /// What is wrong with the membership.
        message: String,
    },

    /// The local member address could not be registered.
    ///
    /// Fatal at startup; the server binary exits with [`crate::EXIT_BIND_FAILURE`].
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address we tried to listen on.
        addr: SocketAddr,
        /// Underlying socket error.
        source: io::Error,
    },

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Generic I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The event loop is gone.
    #[error("channel closed")]
    ChannelClosed,
}

/// Errors returned by a [`crate::transport::Transport`] send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The destination could not be reached. Routed into the failure detector.
    #[error("process {0} is unreachable")]
    Undeliverable(ProcessId),

    /// The destination id is not part of the membership.
    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,
}

/// Wire framing errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Frame body exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Announced body size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Not enough bytes to hold the announced frame.
    #[error("truncated frame: need {needed} bytes, have {have}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        have: usize,
    },

    /// The body is not a valid encoded message.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

impl CommError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        CommError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn membership(message: impl Into<String>) -> Self {
        CommError::Membership {
            message: message.into(),
        }
    }
}
