use std::collections::BTreeSet;

use relog_crypto::SigningKey;
use relog_repo::{PreparedWrite, RecordDelete, RecordWrite, RepoError};
use relog_sequencer::{CommitEvt, OpAction, RepoOp};
use relog_store::{BlockBundle, BlockMap, CommitData};
use relog_types::{Cid, RecordPath};
use tracing::{debug, info, warn};

use crate::context::RecoveryContext;
use crate::error::TaskResult;

/// A commit event decoded into blocks and record writes.
#[derive(Clone, Debug, Default)]
pub struct PreparedCommit {
    pub blocks: BlockMap,
    pub writes: Vec<PreparedWrite>,
    /// Operations whose path, identifier or record bytes could not be
    /// resolved.
    pub dropped: usize,
}

/// What happened to a commit event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied { genesis: bool, ops_dropped: usize },
    /// The stored revision was already at or past the event's.
    Skipped,
}

/// Decode a commit event's block bundle and resolve its operations.
///
/// An unreadable bundle yields no blocks, so only deletes survive. An
/// operation that cannot be resolved is dropped with a warning; the rest of
/// the commit still applies.
pub fn prepare_commit(evt: &CommitEvt) -> PreparedCommit {
    let blocks = match BlockBundle::decode(&evt.blocks) {
        Ok(decoded) => {
            if decoded.skipped > 0 {
                warn!(
                    account = %evt.account,
                    rev = %evt.rev,
                    skipped = decoded.skipped,
                    "commit bundle had unusable blocks"
                );
            }
            decoded.blocks
        }
        Err(e) => {
            warn!(account = %evt.account, rev = %evt.rev, error = %e, "undecodable commit bundle");
            BlockMap::new()
        }
    };

    let mut writes = Vec::with_capacity(evt.ops.len());
    let mut dropped = 0;
    for op in &evt.ops {
        match resolve_op(evt, op, &blocks) {
            Ok(write) => writes.push(write),
            Err(reason) => {
                warn!(
                    account = %evt.account,
                    rev = %evt.rev,
                    action = %op.action,
                    path = %op.path,
                    %reason,
                    "dropping commit operation"
                );
                dropped += 1;
            }
        }
    }

    PreparedCommit {
        blocks,
        writes,
        dropped,
    }
}

fn resolve_op(evt: &CommitEvt, op: &RepoOp, blocks: &BlockMap) -> Result<PreparedWrite, String> {
    let path = RecordPath::parse(&op.path).map_err(|e| e.to_string())?;
    if op.action == OpAction::Delete {
        return Ok(PreparedWrite::Delete(RecordDelete {
            account: evt.account.clone(),
            path,
        }));
    }

    let cid = op.cid.ok_or("operation has no record identifier")?;
    let bytes = blocks
        .get(&cid)
        .ok_or_else(|| format!("record block {} missing from bundle", cid.short_hex()))?;
    let write = RecordWrite::decode(evt.account.clone(), path, cid, bytes).map_err(|e| e.to_string())?;
    Ok(match op.action {
        OpAction::Create => PreparedWrite::Create(write),
        _ => PreparedWrite::Update(write),
    })
}

/// Build the commit record applied to the repository.
///
/// Every decoded block is written. The relevant blocks are the commit node
/// and the records the operations write, when the bundle carried them.
pub fn format_commit(evt: &CommitEvt, prepared: &PreparedCommit, removed_cids: BTreeSet<Cid>) -> CommitData {
    let mut relevant_blocks = BlockMap::new();
    let touched = std::iter::once(evt.commit).chain(prepared.writes.iter().filter_map(PreparedWrite::cid));
    for cid in touched {
        if let Some(bytes) = prepared.blocks.get(&cid) {
            relevant_blocks.add(bytes.to_vec());
        }
    }

    CommitData {
        cid: evt.commit,
        rev: evt.rev.clone(),
        since: evt.since,
        prev: evt.prev,
        new_blocks: prepared.blocks.clone(),
        relevant_blocks,
        removed_cids,
    }
}

/// Apply a commit event to its account's repository.
///
/// A missing repository is created when the event is a genesis commit
/// (`since` is `None`); otherwise it is an error. Before the first commit
/// lands, the account record is created from the repository's persisted
/// signing key, so a crash between the two steps is repaired on replay
/// without minting a second identity.
pub async fn process_commit(ctx: &RecoveryContext, evt: &CommitEvt) -> TaskResult<CommitOutcome> {
    let account = &evt.account;

    if !ctx.actors.exists(account).await? {
        if evt.since.is_some() {
            return Err(RepoError::RepoNotFound(account.clone()).into());
        }
        ctx.actors.create(account, &SigningKey::generate()).await?;
    }

    let stored = ctx.actors.read(account, |state| state.rev().cloned()).await?;
    match &stored {
        Some(rev) if *rev >= evt.rev => {
            debug!(account = %account, stored = %rev, rev = %evt.rev, "skipping stale commit");
            return Ok(CommitOutcome::Skipped);
        }
        Some(_) => {}
        None => ensure_account(ctx, evt).await?,
    }

    let prepared = prepare_commit(evt);
    let applied = ctx
        .actors
        .transact(account, |tx| {
            if tx.current_root().is_some_and(|root| root.rev >= evt.rev) {
                return Ok(None);
            }
            let genesis = tx.current_root().is_none() && evt.since.is_none();
            let removed = tx.removed_cids(&prepared.writes);
            let commit = format_commit(evt, &prepared, removed);
            tx.apply_commit(&commit, genesis)?;
            tx.index_writes(&prepared.writes, &commit.rev);
            tx.process_write_blobs(&prepared.writes);
            Ok(Some(genesis))
        })
        .await?;

    match applied {
        Some(genesis) => {
            if genesis {
                info!(account = %account, rev = %evt.rev, "created repository from genesis commit");
            }
            debug!(
                account = %account,
                rev = %evt.rev,
                writes = prepared.writes.len(),
                dropped = prepared.dropped,
                "applied commit"
            );
            Ok(CommitOutcome::Applied {
                genesis,
                ops_dropped: prepared.dropped,
            })
        }
        None => Ok(CommitOutcome::Skipped),
    }
}

async fn ensure_account(ctx: &RecoveryContext, evt: &CommitEvt) -> TaskResult<()> {
    if ctx.accounts.account_exists(&evt.account).await? {
        return Ok(());
    }
    let key = ctx.actors.signing_key(&evt.account).await?;
    ctx.accounts.create_account(&evt.account, &key).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relog_crypto::ContentHasher;
    use relog_types::{AccountId, Revision};
    use serde_json::json;

    fn commit_evt(ops: Vec<RepoOp>, blocks: &BlockMap, head: Cid) -> CommitEvt {
        CommitEvt {
            account: AccountId::new("did:plc:alice").unwrap(),
            rev: Revision::new("r1").unwrap(),
            since: None,
            prev: None,
            commit: head,
            ops,
            blocks: BlockBundle::encode(&[head], blocks),
        }
    }

    fn op(action: OpAction, path: &str, cid: Option<Cid>) -> RepoOp {
        RepoOp {
            action,
            path: path.into(),
            cid,
        }
    }

    #[test]
    fn resolves_writes_and_blobs() {
        let mut blocks = BlockMap::new();
        let head = blocks.add(b"commit node".to_vec());
        let record = json!({
            "text": "hi",
            "embed": {"$type": "blob", "ref": ContentHasher::BLOB.hash(b"img").to_hex(), "mimeType": "image/png", "size": 10}
        });
        let rec = blocks.add(serde_json::to_vec(&record).unwrap());
        let evt = commit_evt(
            vec![
                op(OpAction::Create, "app.bsky.feed.post/a", Some(rec)),
                op(OpAction::Delete, "app.bsky.feed.post/b", None),
            ],
            &blocks,
            head,
        );

        let prepared = prepare_commit(&evt);
        assert_eq!(prepared.dropped, 0);
        assert_eq!(prepared.writes.len(), 2);
        assert_eq!(prepared.writes[0].blobs().len(), 1);
        assert_eq!(prepared.blocks.len(), 2);
    }

    #[test]
    fn unresolvable_ops_are_dropped() {
        let mut blocks = BlockMap::new();
        let head = blocks.add(b"commit node".to_vec());
        let not_json = blocks.add(b"\xff not json".to_vec());
        let evt = commit_evt(
            vec![
                op(OpAction::Create, "no-slash", Some(head)),
                op(OpAction::Create, "app.bsky.feed.post/a", None),
                op(OpAction::Update, "app.bsky.feed.post/b", Some(ContentHasher::BLOCK.hash(b"absent"))),
                op(OpAction::Create, "app.bsky.feed.post/c", Some(not_json)),
                op(OpAction::Delete, "app.bsky.feed.post/d", None),
            ],
            &blocks,
            head,
        );

        let prepared = prepare_commit(&evt);
        assert_eq!(prepared.dropped, 4);
        assert_eq!(prepared.writes.len(), 1);
        assert!(matches!(prepared.writes[0], PreparedWrite::Delete(_)));
    }

    #[test]
    fn corrupt_bundle_keeps_deletes() {
        let mut evt = commit_evt(
            vec![
                op(OpAction::Create, "app.bsky.feed.post/a", Some(ContentHasher::BLOCK.hash(b"x"))),
                op(OpAction::Delete, "app.bsky.feed.post/b", None),
            ],
            &BlockMap::new(),
            ContentHasher::BLOCK.hash(b"head"),
        );
        evt.blocks = b"garbage".to_vec();

        let prepared = prepare_commit(&evt);
        assert!(prepared.blocks.is_empty());
        assert_eq!(prepared.dropped, 1);
        assert_eq!(prepared.writes.len(), 1);
    }

    #[test]
    fn format_commit_collects_relevant_blocks() {
        let mut blocks = BlockMap::new();
        let head = blocks.add(b"commit node".to_vec());
        let rec = blocks.add(br#"{"text":"a"}"#.to_vec());
        blocks.add(b"unrelated tree node".to_vec());
        let evt = commit_evt(vec![op(OpAction::Create, "app.bsky.feed.post/a", Some(rec))], &blocks, head);

        let prepared = prepare_commit(&evt);
        let removed = BTreeSet::from([ContentHasher::BLOCK.hash(b"old")]);
        let commit = format_commit(&evt, &prepared, removed.clone());
        assert_eq!(commit.cid, head);
        assert!(commit.is_genesis());
        assert_eq!(commit.new_blocks.len(), 3);
        assert_eq!(commit.relevant_blocks.len(), 2);
        assert!(commit.relevant_blocks.has(&rec));
        assert_eq!(commit.removed_cids, removed);
    }
}
