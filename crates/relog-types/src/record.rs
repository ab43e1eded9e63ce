use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::cid::Cid;
use crate::error::TypeError;

/// Address of a record inside a repository: `collection/record-key`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordPath {
    pub collection: String,
    pub rkey: String,
}

impl RecordPath {
    /// Build a path from its parts, validating each segment.
    pub fn new(collection: impl Into<String>, rkey: impl Into<String>) -> Result<Self, TypeError> {
        let collection = collection.into();
        let rkey = rkey.into();
        if !valid_segment(&collection) || !collection.contains('.') || !valid_segment(&rkey) {
            return Err(TypeError::InvalidRecordPath(format!("{collection}/{rkey}")));
        }
        Ok(Self { collection, rkey })
    }

    /// Parse a `collection/rkey` path as carried by commit operations.
    pub fn parse(path: &str) -> Result<Self, TypeError> {
        let (collection, rkey) = path
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidRecordPath(path.to_string()))?;
        Self::new(collection, rkey)
    }

    /// Fully qualified record URI for the owning account.
    pub fn uri(&self, account: &AccountId) -> String {
        format!("at://{account}/{}/{}", self.collection, self.rkey)
    }
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '~'))
}

impl fmt::Debug for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordPath({self})")
    }
}

impl fmt::Display for RecordPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.rkey)
    }
}

impl FromStr for RecordPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A blob referenced from a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    pub cid: Cid,
    pub mime_type: String,
    pub size: u64,
}
