//! Runtime configuration.
//!
//! A [`CommConfig`] is built once by the caller and handed by value to every
//! component that needs it. Nothing reads configuration from global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CommError;

/// Default heartbeat period (P).
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

/// Default liveness timeout (T = 3P).
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default maximum frame body (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Configuration shared by the stages of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommConfig {
    /// How often heartbeats are sent and the liveness scan runs.
    pub heartbeat_period: Duration,
    /// Silence longer than this marks a connected process as failed.
    pub heartbeat_timeout: Duration,
    /// Upper bound for establishing an outbound TCP connection.
    pub connect_timeout: Duration,
    /// Largest accepted frame body in bytes.
    pub max_frame_size: usize,
}

impl Default for CommConfig {
    fn default() -> Self {
        CommConfig {
            heartbeat_period: DEFAULT_HEARTBEAT_PERIOD,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl CommConfig {
    /// Config with the given heartbeat period and timeout, other fields default.
    pub fn with_heartbeat(period: Duration, timeout: Duration) -> Self {
        CommConfig {
            heartbeat_period: period,
            heartbeat_timeout: timeout,
            ..CommConfig::default()
        }
    }

    /// Check the invariants the failure detector relies on.
    pub fn validate(&self) -> Result<(), CommError> {
        if self.heartbeat_period.is_zero() {
            return Err(CommError::config("heartbeat period must be non-zero"));
        }
        if self.heartbeat_timeout <= self.heartbeat_period {
            return Err(CommError::config(format!(
                "heartbeat timeout ({:?}) must exceed heartbeat period ({:?})",
                self.heartbeat_timeout, self.heartbeat_period
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(CommError::config("connect timeout must be non-zero"));
        }
        if self.max_frame_size == 0 {
            return Err(CommError::config("max frame size must be non-zero"));
        }
        Ok(())
    }
}
