//! tillsync - local-first document sync engine for multi-site restaurant
//! operations
//!
//! Each site keeps one local document store per logical collection and
//! replicates continuously against a central server, staying fully
//! operable offline. Subsystems, leaves first:
//!
//! - [`store`]: local stores, secondary indexes, and the provisioner
//! - [`remote`]: existence ensurer and replication transport
//! - [`sync`]: per-store session state machine and supervisor
//! - [`metrics`]: per-store metrics table and event fan-out
//! - [`orchestrator`]: drives the lot and owns shutdown

pub mod cli;
pub mod config;
pub mod metrics;
pub mod orchestrator;
pub mod remote;
pub mod store;
pub mod sync;
