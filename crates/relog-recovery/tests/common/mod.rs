#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use relog_crypto::ContentHasher;
use relog_recovery::{RecoveryConfig, RecoveryContext};
use relog_repo::{ActorStore, DiskAccountStore, RepoSummary};
use relog_sequencer::{AccountEvt, AccountStatus, CommitEvt, EventSource, OpAction, RepoEvent, RepoOp};
use relog_store::{BlockBundle, BlockMap};
use relog_types::{AccountId, Cid, Revision};
use serde_json::{json, Value};

pub fn did(name: &str) -> AccountId {
    AccountId::new(format!("did:plc:{name}")).unwrap()
}

pub fn rev(n: u32) -> Revision {
    Revision::new(format!("r{n:04}")).unwrap()
}

pub fn post(text: &str) -> Value {
    json!({ "$type": "app.bsky.feed.post", "text": text })
}

pub fn post_with_image(text: &str, image: &[u8]) -> Value {
    json!({
        "$type": "app.bsky.feed.post",
        "text": text,
        "embed": {
            "image": {
                "$type": "blob",
                "ref": { "$link": ContentHasher::BLOB.hash(image).to_hex() },
                "mimeType": "image/jpeg",
                "size": image.len(),
            }
        }
    })
}

pub enum Op<'a> {
    Create(&'a str, Value),
    Update(&'a str, Value),
    Delete(&'a str),
    /// Raw operation, for malformed input.
    Raw(RepoOp),
}

/// Build a commit event whose bundle carries the commit node and every
/// written record.
pub fn commit(account: &AccountId, n: u32, since: Option<Cid>, ops: Vec<Op<'_>>) -> CommitEvt {
    let mut blocks = BlockMap::new();
    let head = blocks.add(format!("commit {account} {n}").into_bytes());
    let ops = ops
        .into_iter()
        .map(|op| match op {
            Op::Create(path, record) => RepoOp {
                action: OpAction::Create,
                path: path.into(),
                cid: Some(blocks.add(serde_json::to_vec(&record).unwrap())),
            },
            Op::Update(path, record) => RepoOp {
                action: OpAction::Update,
                path: path.into(),
                cid: Some(blocks.add(serde_json::to_vec(&record).unwrap())),
            },
            Op::Delete(path) => RepoOp {
                action: OpAction::Delete,
                path: path.into(),
                cid: None,
            },
            Op::Raw(op) => op,
        })
        .collect();

    CommitEvt {
        account: account.clone(),
        rev: rev(n),
        since,
        prev: since,
        commit: head,
        ops,
        blocks: BlockBundle::encode(&[head], &blocks),
    }
}

pub fn deleted(account: &AccountId) -> RepoEvent {
    RepoEvent::Account(AccountEvt {
        account: account.clone(),
        status: AccountStatus::Deleted,
    })
}

/// Stores rooted in one directory plus the given event source.
pub async fn context(root: &Path, events: Arc<dyn EventSource>) -> RecoveryContext {
    let accounts = DiskAccountStore::open(root).await.unwrap();
    RecoveryContext::new(events, Arc::new(accounts), Arc::new(ActorStore::new(root)))
}

pub fn small_config() -> RecoveryConfig {
    RecoveryConfig {
        concurrency: 4,
        page_size: 3,
        low_water: 3,
        high_water: 6,
        ..Default::default()
    }
}

pub async fn summary(ctx: &RecoveryContext, account: &AccountId) -> RepoSummary {
    ctx.actors.read(account, |state| state.summary()).await.unwrap()
}
