use relog_types::{AccountId, BlobRef, Cid, RecordPath};
use serde_json::Value;
use tracing::debug;

use crate::error::{RepoError, RepoResult};

/// Kind of change a prepared write makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteAction {
    Create,
    Update,
    Delete,
}

/// A create or update: the record's content identifier and decoded body,
/// plus the blobs the body references.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordWrite {
    pub account: AccountId,
    pub path: RecordPath,
    pub cid: Cid,
    pub record: Value,
    pub blobs: Vec<BlobRef>,
}

impl RecordWrite {
    /// Decode record bytes (JSON) and discover the blobs they reference.
    ///
    /// Blob discovery runs on every decoded record; there is no schema check
    /// that could skip it.
    pub fn decode(account: AccountId, path: RecordPath, cid: Cid, bytes: &[u8]) -> RepoResult<Self> {
        let record: Value = serde_json::from_slice(bytes).map_err(|e| RepoError::InvalidRecord {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if !record.is_object() {
            return Err(RepoError::InvalidRecord {
                path,
                reason: "record is not an object".into(),
            });
        }
        let blobs = find_blob_refs(&record);
        Ok(Self {
            account,
            path,
            cid,
            record,
            blobs,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordDelete {
    pub account: AccountId,
    pub path: RecordPath,
}

/// A single record change derived from a commit operation.
#[derive(Clone, Debug, PartialEq)]
pub enum PreparedWrite {
    Create(RecordWrite),
    Update(RecordWrite),
    Delete(RecordDelete),
}

impl PreparedWrite {
    pub fn action(&self) -> WriteAction {
        match self {
            Self::Create(_) => WriteAction::Create,
            Self::Update(_) => WriteAction::Update,
            Self::Delete(_) => WriteAction::Delete,
        }
    }

    pub fn account(&self) -> &AccountId {
        match self {
            Self::Create(w) | Self::Update(w) => &w.account,
            Self::Delete(d) => &d.account,
        }
    }

    pub fn path(&self) -> &RecordPath {
        match self {
            Self::Create(w) | Self::Update(w) => &w.path,
            Self::Delete(d) => &d.path,
        }
    }

    /// Record identifier written by a create or update; `None` for deletes.
    pub fn cid(&self) -> Option<Cid> {
        match self {
            Self::Create(w) | Self::Update(w) => Some(w.cid),
            Self::Delete(_) => None,
        }
    }

    /// Blobs referenced by the written record. Deletes never carry blobs.
    pub fn blobs(&self) -> &[BlobRef] {
        match self {
            Self::Create(w) | Self::Update(w) => &w.blobs,
            Self::Delete(_) => &[],
        }
    }

    pub fn uri(&self) -> String {
        self.path().uri(self.account())
    }
}

/// Collect every blob reference inside a record body.
///
/// A blob reference is an object of the form
/// `{"$type": "blob", "ref": <cid>, "mimeType": <string>, "size": <int>}`,
/// where `<cid>` is a hex string or `{"$link": <hex>}`. Objects tagged as
/// blobs but missing a field are not references.
pub fn find_blob_refs(value: &Value) -> Vec<BlobRef> {
    let mut found = Vec::new();
    collect_blobs(value, &mut found);
    found
}

fn collect_blobs(value: &Value, out: &mut Vec<BlobRef>) {
    match value {
        Value::Object(map) => {
            if map.get("$type").and_then(Value::as_str) == Some("blob") {
                match parse_blob(map) {
                    Some(blob) => {
                        if !out.contains(&blob) {
                            out.push(blob);
                        }
                    }
                    None => debug!("ignoring incomplete blob reference"),
                }
                return;
            }
            for child in map.values() {
                collect_blobs(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_blobs(child, out);
            }
        }
        _ => {}
    }
}

fn parse_blob(map: &serde_json::Map<String, Value>) -> Option<BlobRef> {
    let link = match map.get("ref")? {
        Value::String(s) => s.as_str(),
        Value::Object(inner) => inner.get("$link")?.as_str()?,
        _ => return None,
    };
    Some(BlobRef {
        cid: Cid::from_hex(link).ok()?,
        mime_type: map.get("mimeType")?.as_str()?.to_string(),
        size: map.get("size")?.as_u64()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relog_crypto::ContentHasher;
    use serde_json::json;

    fn account() -> AccountId {
        AccountId::new("did:plc:alice").unwrap()
    }

    fn path() -> RecordPath {
        RecordPath::parse("app.bsky.feed.post/1").unwrap()
    }

    #[test]
    fn finds_nested_blobs() {
        let img = ContentHasher::BLOB.hash(b"img");
        let vid = ContentHasher::BLOB.hash(b"vid");
        let record = json!({
            "text": "hi",
            "embed": {
                "images": [
                    {"image": {"$type": "blob", "ref": img.to_hex(), "mimeType": "image/png", "size": 10}}
                ],
                "video": {"$type": "blob", "ref": {"$link": vid.to_hex()}, "mimeType": "video/mp4", "size": 99}
            }
        });
        let blobs = find_blob_refs(&record);
        assert_eq!(blobs.len(), 2);
        assert!(blobs.iter().any(|b| b.cid == img && b.size == 10));
        assert!(blobs.iter().any(|b| b.cid == vid && b.mime_type == "video/mp4"));
    }

    #[test]
    fn repeated_blob_listed_once() {
        let img = ContentHasher::BLOB.hash(b"img");
        let blob = json!({"$type": "blob", "ref": img.to_hex(), "mimeType": "image/png", "size": 1});
        let record = json!({"a": blob.clone(), "b": [blob]});
        assert_eq!(find_blob_refs(&record).len(), 1);
    }

    #[test]
    fn incomplete_blob_ignored() {
        let record = json!({"img": {"$type": "blob", "ref": "nothex", "mimeType": "image/png", "size": 1}});
        assert!(find_blob_refs(&record).is_empty());
    }

    #[test]
    fn decode_rejects_non_json_and_non_object() {
        let cid = ContentHasher::BLOCK.hash(b"x");
        assert!(matches!(
            RecordWrite::decode(account(), path(), cid, b"not json"),
            Err(RepoError::InvalidRecord { .. })
        ));
        assert!(matches!(
            RecordWrite::decode(account(), path(), cid, b"[1,2]"),
            Err(RepoError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn delete_carries_no_blobs() {
        let write = PreparedWrite::Delete(RecordDelete {
            account: account(),
            path: path(),
        });
        assert!(write.blobs().is_empty());
        assert_eq!(write.cid(), None);
        assert_eq!(write.action(), WriteAction::Delete);
        assert_eq!(write.uri(), "at://did:plc:alice/app.bsky.feed.post/1");
    }
}
