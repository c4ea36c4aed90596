//! # Published Sync Events
//!
//! The events consumed by UI and monitoring collaborators. Serialized
//! shape is part of the external contract: `sync:status` carries the
//! session status (plus the error message and a metrics snapshot),
//! `sync:change` carries one transferred batch, and `sync:metrics`
//! carries the per-store table row with its derived `totalProgress`.

use serde::Serialize;

use super::registry::MetricsSnapshot;

/// Direction of a transferred batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDirection {
    /// Local changes applied to the remote store
    Push,
    /// Remote changes applied to the local store
    Pull,
}

/// One replication batch, as observers see it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    /// Transfer direction
    pub direction: ChangeDirection,
    /// Documents in the batch
    pub doc_count: usize,
    /// Their keys, in commit order
    pub doc_ids: Vec<String>,
    /// Source sequence the batch checkpointed at
    pub last_seq: u64,
}

/// Event published to every subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Session status transition
    #[serde(rename = "sync:status")]
    Status {
        /// Logical store name
        store: String,
        /// Session status ("initializing", "active", ...)
        status: String,
        /// Error message, on the error path
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Metrics row at the time of the transition
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics: Option<MetricsSnapshot>,
    },

    /// A batch moved in either direction
    #[serde(rename = "sync:change")]
    Change {
        /// Logical store name
        store: String,
        /// Batch payload summary
        change: ChangeSummary,
    },

    /// Metrics row mutated
    #[serde(rename = "sync:metrics")]
    Metrics {
        /// Logical store name
        store: String,
        /// Current row
        metrics: MetricsSnapshot,
        /// Derived completion percentage
        #[serde(rename = "totalProgress")]
        total_progress: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_namespaced() {
        let event = SyncEvent::Change {
            store: "orders".into(),
            change: ChangeSummary {
                direction: ChangeDirection::Push,
                doc_count: 2,
                doc_ids: vec!["a".into(), "b".into()],
                last_seq: 7,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "sync:change");
        assert_eq!(value["change"]["direction"], "push");
        assert_eq!(value["change"]["docCount"], 2);
        assert_eq!(value["change"]["lastSeq"], 7);
    }

    #[test]
    fn test_status_event_omits_empty_error() {
        let event = SyncEvent::Status {
            store: "orders".into(),
            status: "active".into(),
            error: None,
            metrics: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "sync:status");
        assert!(value.get("error").is_none());
    }
}
