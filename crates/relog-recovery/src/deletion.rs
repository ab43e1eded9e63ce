use relog_sequencer::{AccountEvt, AccountStatus};
use tracing::{debug, info};

use crate::context::RecoveryContext;
use crate::error::TaskResult;

/// What happened to an account event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountOutcome {
    /// Storage and account record are gone.
    Deleted,
    /// Only deletions are replayed.
    Ignored,
}

/// Replay an account status change.
///
/// A deletion removes the account's storage directory and its account
/// record. Either may already be absent.
pub async fn process_account(ctx: &RecoveryContext, evt: &AccountEvt) -> TaskResult<AccountOutcome> {
    if evt.status != AccountStatus::Deleted {
        debug!(account = %evt.account, status = %evt.status, "ignoring account event");
        return Ok(AccountOutcome::Ignored);
    }

    let location = ctx.accounts.storage_location(&evt.account).await?;
    match tokio::fs::remove_dir_all(&location).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(account = %evt.account, dir = %location.display(), "no storage to remove");
        }
        Err(e) => return Err(e.into()),
    }
    ctx.actors.evict(&evt.account);
    let had_record = ctx.accounts.delete_account(&evt.account).await?;

    info!(account = %evt.account, had_record, "deleted account");
    Ok(AccountOutcome::Deleted)
}
