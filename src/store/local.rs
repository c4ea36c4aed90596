//! # Local Document Store
//!
//! One append-only record file per logical store, with the latest revision
//! of every document held in memory and rebuilt from the file on open.
//! Tombstones are retained forever so deletions replicate.
//!
//! Writes assign a monotonic per-store update sequence; the changes feed
//! returns documents in commit order, which is what gives replication its
//! per-store ordering guarantee.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use super::errors::{StoreError, StoreResult};
use super::index::{FieldIndex, IndexSpec};
use super::record::{decode_record, encode_record, Document, Revision};

/// Metadata read used as the health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    /// Logical store name
    pub name: String,
    /// Live (non-tombstoned) document count
    pub doc_count: u64,
    /// Retained tombstone count
    pub tombstone_count: u64,
    /// Latest committed update sequence
    pub update_seq: u64,
    /// Record file size in bytes
    pub file_size: u64,
}

/// A page of the changes feed.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Documents in commit order, tombstones included
    pub docs: Vec<Document>,
    /// Sequence the caller should checkpoint after applying this page
    pub last_seq: u64,
    /// Eligible changes left beyond this page
    pub pending: u64,
}

#[derive(Debug)]
struct ChangeEntry {
    id: String,
    /// Whether this write arrived via replication (suppresses echo on push)
    replicated: bool,
}

struct Inner {
    file: File,
    docs: HashMap<String, Document>,
    doc_seqs: HashMap<String, u64>,
    seq_index: BTreeMap<u64, ChangeEntry>,
    update_seq: u64,
    indexes: BTreeMap<String, FieldIndex>,
}

/// A named local document collection.
///
/// Interior-locked so handles can be shared across the replication session
/// and any number of collaborator tasks.
pub struct LocalStore {
    name: String,
    file_path: PathBuf,
    inner: RwLock<Inner>,
}

impl LocalStore {
    /// Open or create the store directory and record file under `data_dir`,
    /// rebuilding the in-memory state from existing records.
    pub fn open(data_dir: &Path, name: &str) -> StoreResult<Self> {
        let dir = data_dir.join(name);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::io(format!("creating {}", dir.display()), e))?;
        let file_path = dir.join("documents.dat");

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&file_path)
            .map_err(|e| StoreError::io(format!("opening {}", file_path.display()), e))?;

        let mut inner = Inner {
            file,
            docs: HashMap::new(),
            doc_seqs: HashMap::new(),
            seq_index: BTreeMap::new(),
            update_seq: 0,
            indexes: BTreeMap::new(),
        };
        Self::rebuild(&mut inner, &file_path, name)?;

        Ok(Self {
            name: name.to_string(),
            file_path,
            inner: RwLock::new(inner),
        })
    }

    /// Replay the record file into the in-memory maps.
    fn rebuild(inner: &mut Inner, file_path: &Path, name: &str) -> StoreResult<()> {
        let file = File::open(file_path)
            .map_err(|e| StoreError::io(format!("reopening {}", file_path.display()), e))?;
        let file_size = file
            .metadata()
            .map_err(|e| StoreError::io("reading file metadata", e))?
            .len();
        let mut reader = BufReader::new(file);
        let mut offset = 0u64;

        while let Some(doc) = decode_record(&mut reader, name, offset, file_size - offset)? {
            // 8 bytes of framing around the payload
            offset += 8 + serde_json::to_vec(&doc)
                .map_err(|e| StoreError::MalformedRecord(e.to_string()))?
                .len() as u64;
            Self::commit(inner, doc, false);
        }
        Ok(())
    }

    /// Record a committed write in the in-memory maps. The caller has
    /// already appended (or replayed) the on-disk record.
    fn commit(inner: &mut Inner, doc: Document, replicated: bool) {
        inner.update_seq += 1;
        let seq = inner.update_seq;
        if let Some(stale) = inner.doc_seqs.insert(doc.id.clone(), seq) {
            inner.seq_index.remove(&stale);
        }
        inner.seq_index.insert(
            seq,
            ChangeEntry {
                id: doc.id.clone(),
                replicated,
            },
        );
        for index in inner.indexes.values_mut() {
            index.apply_write(&doc);
        }
        inner.docs.insert(doc.id.clone(), doc);
    }

    fn append(inner: &mut Inner, doc: Document, replicated: bool) -> StoreResult<()> {
        let frame = encode_record(&doc)?;
        inner
            .file
            .write_all(&frame)
            .map_err(|e| StoreError::io("appending record", e))?;
        inner
            .file
            .sync_data()
            .map_err(|e| StoreError::io("syncing record file", e))?;
        Self::commit(inner, doc, replicated);
        Ok(())
    }

    fn read_inner(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_inner(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Logical store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write a document.
    ///
    /// Updating an existing live document requires its current revision;
    /// a mismatch is a `RevisionConflict`. Creating a document (or writing
    /// over a tombstone) takes `rev: None`.
    pub fn put(
        &self,
        id: &str,
        doc_type: &str,
        body: Map<String, Value>,
        rev: Option<&Revision>,
    ) -> StoreResult<Document> {
        let mut inner = self.write_inner()?;

        let doc = match inner.docs.get(id) {
            Some(current) if !current.deleted => {
                match rev {
                    Some(given) if *given == current.rev => {}
                    other => {
                        return Err(StoreError::RevisionConflict {
                            id: id.to_string(),
                            expected: current.rev.to_string(),
                            actual: other.map(|r| r.to_string()).unwrap_or_else(|| "none".into()),
                        })
                    }
                }
                Document {
                    id: id.to_string(),
                    rev: current.rev.next(),
                    doc_type: doc_type.to_string(),
                    created_at: current.created_at,
                    updated_at: chrono::Utc::now(),
                    deleted: false,
                    body,
                }
            }
            Some(tombstone) => {
                // Resurrection: new document content, but the revision chain
                // continues so it supersedes the tombstone everywhere.
                let mut doc = Document::new(id, doc_type, body);
                doc.rev = tombstone.rev.next();
                doc
            }
            None => {
                if let Some(given) = rev {
                    return Err(StoreError::RevisionConflict {
                        id: id.to_string(),
                        expected: "none".to_string(),
                        actual: given.to_string(),
                    });
                }
                Document::new(id, doc_type, body)
            }
        };

        Self::append(&mut inner, doc.clone(), false)?;
        Ok(doc)
    }

    /// Read a document. Tombstoned documents read as absent.
    pub fn get(&self, id: &str) -> StoreResult<Option<Document>> {
        let inner = self.read_inner()?;
        Ok(inner.docs.get(id).filter(|d| !d.deleted).cloned())
    }

    /// Tombstone a document. The tombstone is a real write and replicates.
    pub fn delete(&self, id: &str, rev: &Revision) -> StoreResult<Document> {
        let mut inner = self.write_inner()?;

        let current = match inner.docs.get(id) {
            Some(d) if !d.deleted => d.clone(),
            _ => return Err(StoreError::NotFound(id.to_string())),
        };
        if current.rev != *rev {
            return Err(StoreError::RevisionConflict {
                id: id.to_string(),
                expected: current.rev.to_string(),
                actual: rev.to_string(),
            });
        }

        let tombstone = current.into_tombstone();
        Self::append(&mut inner, tombstone.clone(), false)?;
        Ok(tombstone)
    }

    /// Apply an existing index spec or build a new one. Re-applying a spec
    /// that is already in place is a no-op.
    pub fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        let mut inner = self.write_inner()?;
        if inner.indexes.contains_key(&spec.name()) {
            return Ok(());
        }
        let mut index = FieldIndex::new(spec.clone());
        for doc in inner.docs.values() {
            index.apply_write(doc);
        }
        inner.indexes.insert(spec.name(), index);
        Ok(())
    }

    /// Names of the provisioned indexes.
    pub fn index_names(&self) -> StoreResult<Vec<String>> {
        let inner = self.read_inner()?;
        Ok(inner.indexes.keys().cloned().collect())
    }

    /// Exact-match lookup through a provisioned index.
    pub fn find_eq(&self, spec: &IndexSpec, values: &[Value]) -> StoreResult<Vec<Document>> {
        let inner = self.read_inner()?;
        let index = inner
            .indexes
            .get(&spec.name())
            .ok_or_else(|| StoreError::IndexMissing(spec.fields().join(", ")))?;
        Ok(index
            .lookup_eq(values)
            .into_iter()
            .filter_map(|id| inner.docs.get(&id).cloned())
            .collect())
    }

    /// Changes committed after `since`, in commit order, at most `limit`
    /// documents. `exclude_replicated` suppresses writes that arrived via
    /// replication, so a push never echoes pulled documents back.
    pub fn changes_since(
        &self,
        since: u64,
        limit: usize,
        exclude_replicated: bool,
    ) -> StoreResult<ChangeSet> {
        let inner = self.read_inner()?;
        let mut docs = Vec::new();
        let mut last_seq = since;
        let mut pending = 0u64;

        for (seq, entry) in inner.seq_index.range(since + 1..) {
            let eligible = !(exclude_replicated && entry.replicated);
            if docs.len() < limit {
                last_seq = *seq;
                if eligible {
                    if let Some(doc) = inner.docs.get(&entry.id) {
                        docs.push(doc.clone());
                    }
                }
            } else if eligible {
                pending += 1;
            }
        }

        Ok(ChangeSet {
            docs,
            last_seq,
            pending,
        })
    }

    /// Apply documents received from the remote side.
    ///
    /// Bypasses the collaborator revision check; conflicts resolve with the
    /// deterministic default rule (higher generation wins, suffix breaks
    /// ties). Returns the number of documents actually written.
    pub fn apply_replicated(&self, docs: &[Document]) -> StoreResult<usize> {
        let mut inner = self.write_inner()?;
        let mut applied = 0;
        for incoming in docs {
            let wins = match inner.docs.get(&incoming.id) {
                Some(current) => incoming.rev.supersedes(&current.rev),
                None => true,
            };
            if wins {
                Self::append(&mut inner, incoming.clone(), true)?;
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Metadata read.
    pub fn info(&self) -> StoreResult<StoreInfo> {
        let inner = self.read_inner()?;
        let tombstones = inner.docs.values().filter(|d| d.deleted).count() as u64;
        let file_size = inner
            .file
            .metadata()
            .map_err(|e| StoreError::io("reading file metadata", e))?
            .len();
        Ok(StoreInfo {
            name: self.name.clone(),
            doc_count: inner.docs.len() as u64 - tombstones,
            tombstone_count: tombstones,
            update_seq: inner.update_seq,
            file_size,
        })
    }

    /// Health probe: confirm the record file answers a metadata read.
    pub fn probe(&self) -> StoreResult<StoreInfo> {
        fs::metadata(&self.file_path)
            .map_err(|e| StoreError::io(format!("probing {}", self.file_path.display()), e))?;
        self.info()
    }

    /// Flush buffered writes to disk.
    pub fn close(&self) -> StoreResult<()> {
        let inner = self.read_inner()?;
        inner
            .file
            .sync_all()
            .map_err(|e| StoreError::io("closing record file", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn body(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_put_get_delete_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();

        let doc = store
            .put("order-1", "order", body(&[("table", json!(4))]), None)
            .unwrap();
        assert_eq!(store.get("order-1").unwrap().unwrap().body["table"], json!(4));

        let updated = store
            .put(
                "order-1",
                "order",
                body(&[("table", json!(5))]),
                Some(&doc.rev),
            )
            .unwrap();
        assert_eq!(updated.rev.generation(), 2);

        store.delete("order-1", &updated.rev).unwrap();
        assert!(store.get("order-1").unwrap().is_none());

        // The tombstone is still a change, not a disappearance.
        let changes = store.changes_since(0, 10, false).unwrap();
        assert_eq!(changes.docs.len(), 1);
        assert!(changes.docs[0].deleted);
    }

    #[test]
    fn test_stale_revision_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();

        let v1 = store.put("o", "order", Map::new(), None).unwrap();
        store
            .put("o", "order", Map::new(), Some(&v1.rev))
            .unwrap();

        let err = store
            .put("o", "order", Map::new(), Some(&v1.rev))
            .unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict { .. }));
    }

    #[test]
    fn test_create_with_revision_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();
        let rev = Revision::first();
        let err = store.put("o", "order", Map::new(), Some(&rev)).unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict { .. }));
    }

    #[test]
    fn test_reopen_rebuilds_state() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open(dir.path(), "menu").unwrap();
            let doc = store
                .put("pizza", "menu_item", body(&[("price", json!(12.5))]), None)
                .unwrap();
            store.delete("pizza", &doc.rev).unwrap();
            store.put("pasta", "menu_item", Map::new(), None).unwrap();
            store.close().unwrap();
        }

        let store = LocalStore::open(dir.path(), "menu").unwrap();
        let info = store.info().unwrap();
        assert_eq!(info.doc_count, 1);
        assert_eq!(info.tombstone_count, 1);
        assert_eq!(info.update_seq, 3);
        assert!(store.get("pizza").unwrap().is_none());
        assert!(store.get("pasta").unwrap().is_some());
    }

    #[test]
    fn test_changes_feed_is_in_commit_order_and_paged() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();
        for i in 0..5 {
            store
                .put(&format!("o{i}"), "order", Map::new(), None)
                .unwrap();
        }

        let page = store.changes_since(0, 2, false).unwrap();
        assert_eq!(page.docs.len(), 2);
        assert_eq!(page.last_seq, 2);
        assert_eq!(page.pending, 3);
        assert_eq!(page.docs[0].id, "o0");

        let rest = store.changes_since(page.last_seq, 10, false).unwrap();
        assert_eq!(rest.docs.len(), 3);
        assert_eq!(rest.pending, 0);
        assert_eq!(rest.last_seq, 5);
    }

    #[test]
    fn test_replicated_writes_do_not_echo_on_push() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();

        store.put("local", "order", Map::new(), None).unwrap();
        let remote_doc = Document::new("remote", "order", Map::new());
        store.apply_replicated(&[remote_doc]).unwrap();

        let push = store.changes_since(0, 10, true).unwrap();
        assert_eq!(push.docs.len(), 1);
        assert_eq!(push.docs[0].id, "local");
        // The checkpoint still advances past the replicated write.
        assert_eq!(push.last_seq, 2);
    }

    #[test]
    fn test_apply_replicated_resolves_by_revision() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();

        let local = store.put("o", "order", body(&[("v", json!("local"))]), None).unwrap();

        // Same generation, losing suffix: skipped.
        let mut losing = local.clone();
        losing.rev = "1-0000000000000000".parse().unwrap();
        losing.body = body(&[("v", json!("losing"))]);
        assert_eq!(store.apply_replicated(&[losing]).unwrap(), 0);

        // Higher generation: applied.
        let mut winning = local.clone();
        winning.rev = local.rev.next();
        winning.body = body(&[("v", json!("winning"))]);
        assert_eq!(store.apply_replicated(&[winning]).unwrap(), 1);
        assert_eq!(store.get("o").unwrap().unwrap().body["v"], json!("winning"));
    }

    #[test]
    fn test_ensure_index_is_idempotent_and_queryable() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();
        store
            .put("o1", "order", body(&[("status", json!("open"))]), None)
            .unwrap();

        let spec = IndexSpec::new(["status"]);
        store.ensure_index(&spec).unwrap();
        store.ensure_index(&spec).unwrap();
        assert_eq!(store.index_names().unwrap(), vec!["status".to_string()]);

        let hits = store.find_eq(&spec, &[json!("open")]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "o1");
    }

    #[test]
    fn test_find_eq_without_index_fails() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "orders").unwrap();
        let spec = IndexSpec::new(["status"]);
        assert!(matches!(
            store.find_eq(&spec, &[json!("open")]),
            Err(StoreError::IndexMissing(_))
        ));
    }

    #[test]
    fn test_open_rejects_corrupt_length_field() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("orders")).unwrap();
        // A length field claiming 4 GiB in a 7-byte file.
        fs::write(
            dir.path().join("orders/documents.dat"),
            [0xff, 0xff, 0xff, 0xff, 1, 2, 3],
        )
        .unwrap();

        assert!(matches!(
            LocalStore::open(dir.path(), "orders"),
            Err(StoreError::Corruption { .. })
        ));
    }

    #[test]
    fn test_probe_reports_metadata() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path(), "loyalty").unwrap();
        store.put("member-1", "member", Map::new(), None).unwrap();

        let info = store.probe().unwrap();
        assert_eq!(info.name, "loyalty");
        assert_eq!(info.doc_count, 1);
        assert_eq!(info.update_seq, 1);
        assert!(info.file_size > 0);
    }
}
