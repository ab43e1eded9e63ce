use chrono::{DateTime, Utc};
use relog_types::{AccountId, Cid, Revision};
use serde::{Deserialize, Serialize};

/// Position of an event in the log. Strictly increasing; `0` precedes the
/// first event.
pub type Seq = u64;

/// Kind of change a commit operation makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// One record operation in a commit, in commit order.
///
/// `path` is the raw `collection/rkey` string as sequenced; it is validated
/// when the commit is applied. `cid` is present for creates and updates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOp {
    pub action: OpAction,
    pub path: String,
    #[serde(default)]
    pub cid: Option<Cid>,
}

/// A commit to one account's repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvt {
    pub account: AccountId,
    pub rev: Revision,
    /// Root the commit builds on; `None` marks the genesis commit.
    #[serde(default)]
    pub since: Option<Cid>,
    #[serde(default)]
    pub prev: Option<Cid>,
    /// Identifier of the commit node (the new head).
    pub commit: Cid,
    pub ops: Vec<RepoOp>,
    /// Block bundle carrying the commit node and every record the ops write.
    #[serde(with = "hex_bytes")]
    pub blocks: Vec<u8>,
}

impl CommitEvt {
    pub fn is_genesis(&self) -> bool {
        self.since.is_none()
    }
}

/// Hosting status of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Deactivated,
    Suspended,
    Takendown,
    Deleted,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Deactivated => "deactivated",
            Self::Suspended => "suspended",
            Self::Takendown => "takendown",
            Self::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// A change in an account's hosting status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvt {
    pub account: AccountId,
    pub status: AccountStatus,
}

/// An account-scoped event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoEvent {
    Commit(CommitEvt),
    Account(AccountEvt),
}

impl RepoEvent {
    /// The account the event belongs to; the scheduling key.
    pub fn account(&self) -> &AccountId {
        match self {
            Self::Commit(evt) => &evt.account,
            Self::Account(evt) => &evt.account,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Commit(_) => "commit",
            Self::Account(_) => "account",
        }
    }
}

/// An event with its log position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeqEvent {
    pub seq: Seq,
    pub event: RepoEvent,
    pub sequenced_at: DateTime<Utc>,
}

impl SeqEvent {
    pub fn new(seq: Seq, event: RepoEvent) -> Self {
        Self {
            seq,
            event,
            sequenced_at: Utc::now(),
        }
    }
}

/// Bytes as a hex string in human-readable formats, raw bytes otherwise.
mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(bytes))
        } else {
            serializer.serialize_bytes(bytes)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            hex::decode(&s).map_err(de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}
