//! Metrics & Event Broadcast Subsystem
//!
//! Per-store replication metrics and the fan-out of `sync:status`,
//! `sync:change`, and `sync:metrics` events to UI and monitoring
//! subscribers.

mod events;
mod registry;

pub use events::{ChangeDirection, ChangeSummary, SyncEvent};
pub use registry::{MetricsRegistry, MetricsSnapshot, RecordedError};
