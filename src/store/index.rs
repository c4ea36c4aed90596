//! # Secondary Indexes
//!
//! In-memory field-set indexes rebuilt from storage on open and maintained
//! on every write. An index key is the ordered list of canonicalized field
//! values; a missing field indexes as JSON `null`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::record::Document;

/// Specification of one secondary index: the ordered field set it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    fields: Vec<String>,
}

impl IndexSpec {
    /// Build a spec over an ordered field set.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Canonical index name: fields joined by `+`.
    pub fn name(&self) -> String {
        self.fields.join("+")
    }

    /// Fields covered by this index.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

/// Canonical string form of an indexed value.
///
/// JSON serialization keeps distinct types distinct (`"12"` vs `12`).
fn canonical(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => Value::Null.to_string(),
    }
}

/// One field-set index: canonical key -> document ids.
#[derive(Debug)]
pub struct FieldIndex {
    spec: IndexSpec,
    entries: BTreeMap<Vec<String>, BTreeSet<String>>,
}

impl FieldIndex {
    /// Create an empty index for a spec.
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    /// The spec this index was built from.
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn key_for(&self, doc: &Document) -> Vec<String> {
        self.spec
            .fields
            .iter()
            .map(|f| canonical(doc.body.get(f)))
            .collect()
    }

    /// Index a live document. Tombstones are removed instead.
    pub fn apply_write(&mut self, doc: &Document) {
        self.remove(&doc.id);
        if doc.deleted {
            return;
        }
        self.entries
            .entry(self.key_for(doc))
            .or_default()
            .insert(doc.id.clone());
    }

    /// Drop a document id from every key.
    pub fn remove(&mut self, doc_id: &str) {
        self.entries.retain(|_, ids| {
            ids.remove(doc_id);
            !ids.is_empty()
        });
    }

    /// Exact-match lookup: ids of documents whose indexed fields equal the
    /// given values, in id order.
    pub fn lookup_eq(&self, values: &[Value]) -> Vec<String> {
        let key: Vec<String> = values.iter().map(|v| canonical(Some(v))).collect();
        self.entries
            .get(&key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn doc(id: &str, table: i64, status: &str) -> Document {
        let mut body = Map::new();
        body.insert("table".into(), json!(table));
        body.insert("status".into(), json!(status));
        Document::new(id, "order", body)
    }

    #[test]
    fn test_lookup_eq_matches_field_set() {
        let mut index = FieldIndex::new(IndexSpec::new(["table", "status"]));
        index.apply_write(&doc("o1", 4, "open"));
        index.apply_write(&doc("o2", 4, "open"));
        index.apply_write(&doc("o3", 4, "closed"));

        let hits = index.lookup_eq(&[json!(4), json!("open")]);
        assert_eq!(hits, vec!["o1".to_string(), "o2".to_string()]);
    }

    #[test]
    fn test_distinct_types_do_not_collide() {
        let mut index = FieldIndex::new(IndexSpec::new(["table"]));
        let mut body = Map::new();
        body.insert("table".into(), json!("4"));
        index.apply_write(&Document::new("s", "order", body));

        assert!(index.lookup_eq(&[json!(4)]).is_empty());
        assert_eq!(index.lookup_eq(&[json!("4")]), vec!["s".to_string()]);
    }

    #[test]
    fn test_missing_field_indexes_as_null() {
        let mut index = FieldIndex::new(IndexSpec::new(["server"]));
        index.apply_write(&doc("o1", 1, "open"));
        assert_eq!(index.lookup_eq(&[json!(null)]), vec!["o1".to_string()]);
    }

    #[test]
    fn test_tombstone_removes_entry() {
        let mut index = FieldIndex::new(IndexSpec::new(["table"]));
        let d = doc("o1", 9, "open");
        index.apply_write(&d);
        assert_eq!(index.lookup_eq(&[json!(9)]).len(), 1);

        index.apply_write(&d.into_tombstone());
        assert!(index.lookup_eq(&[json!(9)]).is_empty());
    }

    #[test]
    fn test_rewrite_moves_entry() {
        let mut index = FieldIndex::new(IndexSpec::new(["status"]));
        let mut d = doc("o1", 2, "open");
        index.apply_write(&d);

        d.body.insert("status".into(), json!("closed"));
        d.rev = d.rev.next();
        index.apply_write(&d);

        assert!(index.lookup_eq(&[json!("open")]).is_empty());
        assert_eq!(index.lookup_eq(&[json!("closed")]), vec!["o1".to_string()]);
    }
}
