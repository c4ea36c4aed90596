//! # Session Options
//!
//! Per-store replication configuration, passed straight to the transport.
//! The defaults are a compatibility contract with the deployed platform
//! and must not drift.

use serde::{Deserialize, Serialize};

/// Options for one replication session.
///
/// Configured externally, immutable once the session starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SessionOptions {
    /// Continuous replication; always true for this platform
    pub live: bool,

    /// Restart automatically after a transport failure
    pub retry: bool,

    /// Documents per replication batch
    pub batch_size: usize,

    /// Batches transferred back-to-back before re-checking for shutdown
    pub max_in_flight_batches: usize,

    /// Network timeout applied to every remote call, in milliseconds
    pub timeout_ms: u64,

    /// Idle interval between remote heartbeat probes, in milliseconds
    pub heartbeat_ms: u64,

    /// Fixed delay before a replacement session is started, in milliseconds
    pub restart_delay_ms: u64,

    /// Restart ceiling; `None` restarts indefinitely
    pub max_restarts: Option<u32>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            live: true,
            retry: true,
            batch_size: 100,
            max_in_flight_batches: 2,
            timeout_ms: 60_000,
            heartbeat_ms: 10_000,
            restart_delay_ms: 5_000,
            max_restarts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The documented defaults are bit-exact compatibility values.
    #[test]
    fn test_default_options_contract() {
        let opts = SessionOptions::default();
        assert!(opts.live);
        assert!(opts.retry);
        assert_eq!(opts.batch_size, 100);
        assert_eq!(opts.max_in_flight_batches, 2);
        assert_eq!(opts.timeout_ms, 60_000);
        assert_eq!(opts.heartbeat_ms, 10_000);
        assert_eq!(opts.restart_delay_ms, 5_000);
        assert_eq!(opts.max_restarts, None);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let opts: SessionOptions =
            serde_json::from_str(r#"{"batch_size": 25, "max_restarts": 3}"#).unwrap();
        assert_eq!(opts.batch_size, 25);
        assert_eq!(opts.max_restarts, Some(3));
        assert_eq!(opts.timeout_ms, 60_000);
        assert!(opts.live);
    }
}
