use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use relog_crypto::SigningKey;
use relog_types::AccountId;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::error::{RepoError, RepoResult};
use crate::layout::{account_dir, KEY_FILE, REPO_FILE};
use crate::repo::RepoState;
use crate::transaction::RepoTransaction;

#[derive(Default)]
struct Slot {
    state: Option<RepoState>,
}

/// Per-account repositories stored on disk under one root directory.
///
/// Each account gets a directory holding a bincode snapshot of its
/// [`RepoState`] and its hex-encoded signing key. A loaded state stays
/// cached only while some task holds or waits on the account's lock; the
/// last one out drops it, so memory follows the accounts in flight rather
/// than every account ever touched. Access to one account is serialized by
/// a per-account async lock; different accounts proceed independently.
///
/// A transaction works on a copy of the state. The copy is persisted with
/// write-to-temp then rename and only then replaces the cached state, so a
/// failed transaction or a crash mid-write leaves the previous state intact.
pub struct ActorStore {
    root: PathBuf,
    slots: Mutex<HashMap<AccountId, Arc<AsyncMutex<Slot>>>>,
}

impl ActorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage directory of an account's repository.
    pub fn location(&self, account: &AccountId) -> PathBuf {
        account_dir(&self.root, account)
    }

    /// Whether a repository exists on disk for the account.
    pub async fn exists(&self, account: &AccountId) -> RepoResult<bool> {
        Ok(tokio::fs::try_exists(self.location(account).join(REPO_FILE)).await?)
    }

    /// Create an empty repository and persist its signing key.
    pub async fn create(&self, account: &AccountId, key: &SigningKey) -> RepoResult<()> {
        let slot = self.slot(account);
        let result: RepoResult<()> = async {
            let mut guard = slot.lock().await;
            if self.exists(account).await? {
                return Err(RepoError::RepoExists(account.clone()));
            }

            let dir = self.location(account);
            tokio::fs::create_dir_all(&dir).await?;
            write_atomic(&dir.join(KEY_FILE), key.to_hex().as_bytes()).await?;
            let state = RepoState::new();
            write_atomic(&dir.join(REPO_FILE), &bincode::serialize(&state)?).await?;
            guard.state = Some(state);

            info!(account = %account, dir = %dir.display(), "created repository");
            Ok(())
        }
        .await;
        self.release(account, slot);
        result
    }

    /// Run `f` atomically against the account's repository.
    ///
    /// If `f` fails, nothing is persisted and the cached state is unchanged.
    pub async fn transact<T, F>(&self, account: &AccountId, f: F) -> RepoResult<T>
    where
        F: FnOnce(&mut RepoTransaction<'_>) -> RepoResult<T> + Send,
        T: Send,
    {
        let slot = self.slot(account);
        let result: RepoResult<T> = async {
            let mut guard = slot.lock().await;
            let mut working = match &guard.state {
                Some(state) => state.clone(),
                None => self.load(account).await?,
            };

            let value = {
                let mut tx = RepoTransaction::new(account, &mut working);
                f(&mut tx)?
            };

            self.persist(account, &working).await?;
            guard.state = Some(working);
            Ok(value)
        }
        .await;
        self.release(account, slot);
        result
    }

    /// Read the account's repository state.
    pub async fn read<T, F>(&self, account: &AccountId, f: F) -> RepoResult<T>
    where
        F: FnOnce(&RepoState) -> T + Send,
        T: Send,
    {
        let slot = self.slot(account);
        let result: RepoResult<T> = async {
            let mut guard = slot.lock().await;
            if guard.state.is_none() {
                guard.state = Some(self.load(account).await?);
            }
            match &guard.state {
                Some(state) => Ok(f(state)),
                None => Err(RepoError::RepoNotFound(account.clone())),
            }
        }
        .await;
        self.release(account, slot);
        result
    }

    /// Load the account's persisted signing key.
    pub async fn signing_key(&self, account: &AccountId) -> RepoResult<SigningKey> {
        let path = self.location(account).join(KEY_FILE);
        let hex = match tokio::fs::read_to_string(&path).await {
            Ok(hex) => hex,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoError::RepoNotFound(account.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(SigningKey::from_hex(hex.trim())?)
    }

    /// Drop the cached state of an account, e.g. after its directory was
    /// removed.
    pub fn evict(&self, account: &AccountId) {
        let removed = self
            .slots
            .lock()
            .expect("lock poisoned")
            .remove(account)
            .is_some();
        if removed {
            debug!(account = %account, "evicted cached repository");
        }
    }

    /// Directories under the root that hold a repository snapshot.
    pub async fn repository_dirs(&self) -> RepoResult<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        let mut shards = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
            Err(e) => return Err(e.into()),
        };
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                if tokio::fs::try_exists(entry.path().join(REPO_FILE)).await? {
                    dirs.push(entry.path());
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn slot(&self, account: &AccountId) -> Arc<AsyncMutex<Slot>> {
        let mut slots = self.slots.lock().expect("lock poisoned");
        Arc::clone(slots.entry(account.clone()).or_default())
    }

    /// Forget the account's slot, and its cached state, when `slot` and the
    /// map hold the only references to it.
    fn release(&self, account: &AccountId, slot: Arc<AsyncMutex<Slot>>) {
        let mut slots = self.slots.lock().expect("lock poisoned");
        let ours = slots.get(account).is_some_and(|s| Arc::ptr_eq(s, &slot));
        if ours && Arc::strong_count(&slot) == 2 {
            slots.remove(account);
        }
    }

    /// Number of accounts with a live slot.
    pub fn cached_accounts(&self) -> usize {
        self.slots.lock().expect("lock poisoned").len()
    }

    async fn load(&self, account: &AccountId) -> RepoResult<RepoState> {
        let path = self.location(account).join(REPO_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bincode::deserialize(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RepoError::RepoNotFound(account.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, account: &AccountId, state: &RepoState) -> RepoResult<()> {
        let dir = self.location(account);
        if !tokio::fs::try_exists(&dir).await? {
            return Err(RepoError::RepoNotFound(account.clone()));
        }
        write_atomic(&dir.join(REPO_FILE), &bincode::serialize(state)?).await
    }
}

impl std::fmt::Debug for ActorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorStore")
            .field("root", &self.root)
            .field("cached", &self.cached_accounts())
            .finish()
    }
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> RepoResult<()> {
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
