//! # Documents and Storage Records
//!
//! The unit of replication is a JSON document carrying its own identity
//! (`_id`), an opaque revision token (`_rev`), a type discriminator, and a
//! tombstone marker (`_deleted`). Deletes never remove the record; they
//! write a new revision with the tombstone set so the deletion itself
//! replicates like any other change.
//!
//! On disk a document is framed as:
//!
//! ```text
//! +------------------+
//! | Payload Length   | (u32 LE)
//! +------------------+
//! | JSON Payload     | (serialized Document)
//! +------------------+
//! | Checksum         | (u32 LE, CRC32 of the payload)
//! +------------------+
//! ```
//!
//! Every read validates the checksum; a mismatch aborts the scan.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};

/// Opaque revision token: `generation-suffix`.
///
/// The generation counts writes to the document; the suffix makes tokens
/// from concurrent writers distinct. Comparison is used only for the
/// deterministic replicated-write conflict rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    generation: u64,
    suffix: String,
}

impl Revision {
    /// Revision for the first write of a document.
    pub fn first() -> Self {
        Self {
            generation: 1,
            suffix: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Revision for the write that supersedes this one.
    pub fn next(&self) -> Self {
        Self {
            generation: self.generation + 1,
            suffix: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Write generation of this revision.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deterministic conflict rule for replicated writes: higher generation
    /// wins, ties broken by lexicographic comparison of the suffix.
    pub fn supersedes(&self, other: &Revision) -> bool {
        match self.generation.cmp(&other.generation) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.suffix > other.suffix,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.suffix)
    }
}

impl FromStr for Revision {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, suffix) = s
            .split_once('-')
            .ok_or_else(|| StoreError::InvalidRevision(s.to_string()))?;
        let generation: u64 = generation
            .parse()
            .map_err(|_| StoreError::InvalidRevision(s.to_string()))?;
        if suffix.is_empty() {
            return Err(StoreError::InvalidRevision(s.to_string()));
        }
        Ok(Self {
            generation,
            suffix: suffix.to_string(),
        })
    }
}

impl Serialize for Revision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A replicated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Globally unique document key
    #[serde(rename = "_id")]
    pub id: String,

    /// Opaque revision token for optimistic concurrency
    #[serde(rename = "_rev")]
    pub rev: Revision,

    /// Type discriminator ("order", "menu_item", ...)
    #[serde(rename = "type")]
    pub doc_type: String,

    /// Creation timestamp, preserved across updates
    pub created_at: DateTime<Utc>,

    /// Timestamp of the latest write
    pub updated_at: DateTime<Utc>,

    /// Tombstone marker; set instead of physical deletion
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,

    /// Application fields
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Document {
    /// Build the first revision of a document.
    pub fn new(id: impl Into<String>, doc_type: impl Into<String>, body: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            rev: Revision::first(),
            doc_type: doc_type.into(),
            created_at: now,
            updated_at: now,
            deleted: false,
            body,
        }
    }

    /// Build the tombstone revision that supersedes this document.
    ///
    /// The body is cleared; the tombstone still replicates as a change.
    pub fn into_tombstone(self) -> Self {
        Self {
            rev: self.rev.next(),
            updated_at: Utc::now(),
            deleted: true,
            body: Map::new(),
            ..self
        }
    }
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

/// Encode a document into its on-disk frame.
pub fn encode_record(doc: &Document) -> StoreResult<Vec<u8>> {
    let payload =
        serde_json::to_vec(doc).map_err(|e| StoreError::MalformedRecord(e.to_string()))?;
    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&checksum(&payload).to_le_bytes());
    Ok(frame)
}

/// Decode the next document frame from a reader.
///
/// `remaining` is how many bytes are left in the source; the length field
/// is validated against it before the payload buffer is allocated, so a
/// corrupted length byte cannot drive a multi-gigabyte allocation.
///
/// Returns `Ok(None)` at a clean end of file. A checksum mismatch, a
/// truncated frame, or an impossible length is corruption, not end of
/// data.
pub fn decode_record<R: Read>(
    reader: &mut R,
    store: &str,
    offset: u64,
    remaining: u64,
) -> StoreResult<Option<Document>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(StoreError::io("reading record length", e)),
    }
    let len = u64::from(u32::from_le_bytes(len_buf));

    // The frame adds 8 bytes around the payload; a zero length or one that
    // cannot fit in what is left of the source is a corrupted length field.
    if len == 0 || len + 8 > remaining {
        return Err(StoreError::Corruption {
            store: store.to_string(),
            offset,
        });
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|_| StoreError::Corruption {
            store: store.to_string(),
            offset,
        })?;

    let mut crc_buf = [0u8; 4];
    reader
        .read_exact(&mut crc_buf)
        .map_err(|_| StoreError::Corruption {
            store: store.to_string(),
            offset,
        })?;

    if checksum(&payload) != u32::from_le_bytes(crc_buf) {
        return Err(StoreError::Corruption {
            store: store.to_string(),
            offset,
        });
    }

    let doc = serde_json::from_slice(&payload)
        .map_err(|e| StoreError::MalformedRecord(e.to_string()))?;
    Ok(Some(doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_roundtrip() {
        let rev = Revision::first();
        let parsed: Revision = rev.to_string().parse().unwrap();
        assert_eq!(rev, parsed);
        assert_eq!(parsed.generation(), 1);
    }

    #[test]
    fn test_revision_rejects_garbage() {
        assert!("nodash".parse::<Revision>().is_err());
        assert!("x-abc".parse::<Revision>().is_err());
        assert!("3-".parse::<Revision>().is_err());
    }

    #[test]
    fn test_next_revision_supersedes() {
        let rev = Revision::first();
        let next = rev.next();
        assert!(next.supersedes(&rev));
        assert!(!rev.supersedes(&next));
    }

    #[test]
    fn test_same_generation_tiebreak_is_deterministic() {
        let a: Revision = "2-aaaa".parse().unwrap();
        let b: Revision = "2-bbbb".parse().unwrap();
        assert!(b.supersedes(&a));
        assert!(!a.supersedes(&b));
    }

    #[test]
    fn test_tombstone_keeps_id_and_bumps_revision() {
        let doc = Document::new("order-1", "order", Map::new());
        let gen = doc.rev.generation();
        let tomb = doc.clone().into_tombstone();
        assert_eq!(tomb.id, "order-1");
        assert!(tomb.deleted);
        assert!(tomb.body.is_empty());
        assert_eq!(tomb.rev.generation(), gen + 1);
    }

    #[test]
    fn test_tombstone_marker_serialized_only_when_set() {
        let doc = Document::new("t-1", "table", Map::new());
        let live = serde_json::to_value(&doc).unwrap();
        assert!(live.get("_deleted").is_none());

        let tomb = serde_json::to_value(doc.into_tombstone()).unwrap();
        assert_eq!(tomb["_deleted"], serde_json::json!(true));
    }

    #[test]
    fn test_record_roundtrip() {
        let mut body = Map::new();
        body.insert("table".into(), serde_json::json!(12));
        let doc = Document::new("order-7", "order", body);

        let frame = encode_record(&doc).unwrap();
        let remaining = frame.len() as u64;
        let mut cursor = std::io::Cursor::new(frame);
        let decoded = decode_record(&mut cursor, "orders", 0, remaining)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, doc);
        assert!(decode_record(&mut cursor, "orders", 0, 0).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let doc = Document::new("order-8", "order", Map::new());
        let mut frame = encode_record(&doc).unwrap();
        let mid = frame.len() / 2;
        frame[mid] ^= 0x01;
        let remaining = frame.len() as u64;
        let mut cursor = std::io::Cursor::new(frame);
        assert!(matches!(
            decode_record(&mut cursor, "orders", 0, remaining),
            Err(StoreError::Corruption { .. })
        ));
    }

    #[test]
    fn test_corrupt_length_field_rejected_before_allocation() {
        let doc = Document::new("order-9", "order", Map::new());
        let mut frame = encode_record(&doc).unwrap();
        // A single flipped length byte must not drive a giant allocation.
        frame[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        let remaining = frame.len() as u64;
        let mut cursor = std::io::Cursor::new(frame);
        assert!(matches!(
            decode_record(&mut cursor, "orders", 0, remaining),
            Err(StoreError::Corruption { .. })
        ));
    }

    #[test]
    fn test_zero_length_field_rejected() {
        let mut cursor = std::io::Cursor::new(vec![0u8; 12]);
        assert!(matches!(
            decode_record(&mut cursor, "orders", 0, 12),
            Err(StoreError::Corruption { .. })
        ));
    }
}
