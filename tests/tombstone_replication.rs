//! Tombstone and Document Propagation Tests
//!
//! A delete is a tombstone write and must cross the wire like any other
//! change: the remote copy carries the marker after sync, in both
//! directions. Exercises one supervised session against the in-process
//! remote backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tempfile::TempDir;

use tillsync::metrics::{ChangeDirection, MetricsRegistry, SyncEvent};
use tillsync::remote::{MemoryRemoteBackend, RemoteBackend};
use tillsync::store::{Document, StoreProvisioner};
use tillsync::sync::{self, SessionHandle, SessionOptions};

const URL: &str = "mem://central/orders";

fn fast_options() -> SessionOptions {
    SessionOptions {
        heartbeat_ms: 25,
        restart_delay_ms: 100,
        timeout_ms: 2_000,
        ..SessionOptions::default()
    }
}

async fn wait_for<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

struct Harness {
    _dir: TempDir,
    provisioner: StoreProvisioner,
    backend: Arc<MemoryRemoteBackend>,
    registry: Arc<MetricsRegistry>,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let provisioner = StoreProvisioner::new(dir.path());
        provisioner.open("orders", &[]).await.unwrap();

        let backend = Arc::new(MemoryRemoteBackend::new());
        backend.ensure(URL).await.unwrap();

        let registry = Arc::new(MetricsRegistry::new());
        registry.init_store("orders");

        Self {
            _dir: dir,
            provisioner,
            backend,
            registry,
        }
    }

    fn spawn_session(&self) -> SessionHandle {
        sync::spawn(
            "orders",
            self.provisioner.get("orders").unwrap(),
            self.backend.open(URL),
            fast_options(),
            self.registry.clone(),
        )
    }
}

fn order_body(table: i64) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("table".into(), json!(table));
    body
}

/// A local write is pushed to the remote store.
#[tokio::test]
async fn test_local_write_reaches_remote() {
    let harness = Harness::new().await;
    let handle = harness.spawn_session();

    let local = harness.provisioner.get("orders").unwrap();
    local.put("order-1", "order", order_body(4), None).unwrap();

    let remote = harness.backend.store(URL).unwrap();
    wait_for(|| remote.get("order-1").is_some(), "push of order-1").await;
    assert_eq!(remote.get("order-1").unwrap().body["table"], json!(4));

    handle.stop().await;
}

/// A local tombstone is delivered as a change and the remote copy carries
/// the marker after sync.
#[tokio::test]
async fn test_tombstone_propagates_to_remote() {
    let harness = Harness::new().await;
    let mut events = harness.registry.subscribe();
    let handle = harness.spawn_session();

    let local = harness.provisioner.get("orders").unwrap();
    let doc = local.put("order-1", "order", order_body(4), None).unwrap();

    let remote = harness.backend.store(URL).unwrap();
    wait_for(|| remote.get("order-1").is_some(), "push of order-1").await;

    local.delete("order-1", &doc.rev).unwrap();
    wait_for(
        || remote.get("order-1").map(|d| d.deleted).unwrap_or(false),
        "tombstone on remote",
    )
    .await;

    handle.stop().await;

    // The tombstone travelled as an observable change event, not silently.
    let mut tombstone_pushed = false;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::Change { change, .. } = event {
            if change.direction == ChangeDirection::Push
                && change.doc_ids.contains(&"order-1".to_string())
            {
                tombstone_pushed = true;
            }
        }
    }
    assert!(tombstone_pushed);
}

/// Remote writes (another site) are pulled into the local store, and a
/// remote tombstone removes the local copy from reads.
#[tokio::test]
async fn test_remote_tombstone_pulled_locally() {
    let harness = Harness::new().await;
    let handle = harness.spawn_session();

    let remote = harness.backend.store(URL).unwrap();
    let seeded = Document::new("order-9", "order", order_body(7));
    remote.seed(seeded.clone());

    let local = harness.provisioner.get("orders").unwrap();
    wait_for(
        || local.get("order-9").ok().flatten().is_some(),
        "pull of order-9",
    )
    .await;

    remote.seed(seeded.into_tombstone());
    wait_for(
        || local.get("order-9").ok().flatten().is_none(),
        "pull of tombstone",
    )
    .await;

    // Tombstoned locally, not physically removed.
    let info = local.info().unwrap();
    assert_eq!(info.tombstone_count, 1);

    handle.stop().await;
}

/// Pushed documents are not echoed back as pulls forever: the session
/// settles into the paused steady state once caught up.
#[tokio::test]
async fn test_session_settles_paused_when_caught_up() {
    let harness = Harness::new().await;
    let handle = harness.spawn_session();

    let local = harness.provisioner.get("orders").unwrap();
    local.put("order-1", "order", order_body(1), None).unwrap();

    let registry = harness.registry.clone();
    wait_for(
        || {
            registry
                .snapshot("orders")
                .map(|m| m.status == "paused")
                .unwrap_or(false)
        },
        "paused steady state",
    )
    .await;

    assert!(harness.registry.snapshot("orders").unwrap().errors.is_empty());
    handle.stop().await;
}
