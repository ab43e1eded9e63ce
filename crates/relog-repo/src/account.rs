use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relog_crypto::SigningKey;
use relog_types::AccountId;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::actor_store::write_atomic;
use crate::error::RepoResult;
use crate::layout::account_dir;

/// Accounts file under a disk account store's root.
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// Account record kept by an account store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub did: AccountId,
    /// Hex-encoded public half of the account's signing key.
    pub signing_key: String,
    pub created_at: DateTime<Utc>,
}

/// Account identity and storage location lookup.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account_exists(&self, id: &AccountId) -> RepoResult<bool>;

    /// Record a new account. Creating an existing account keeps the
    /// original record.
    async fn create_account(&self, id: &AccountId, key: &SigningKey) -> RepoResult<()>;

    /// Remove an account record. Returns `false` if there was none.
    async fn delete_account(&self, id: &AccountId) -> RepoResult<bool>;

    /// Directory holding the account's repository.
    async fn storage_location(&self, id: &AccountId) -> RepoResult<PathBuf>;

    async fn get_account(&self, id: &AccountId) -> RepoResult<Option<AccountRecord>>;
}

fn new_record(id: &AccountId, key: &SigningKey) -> AccountRecord {
    AccountRecord {
        did: id.clone(),
        signing_key: key.verifying_key().to_hex(),
        created_at: Utc::now(),
    }
}

/// Account store persisted as a JSON file beside the repositories.
pub struct DiskAccountStore {
    root: PathBuf,
    accounts: Mutex<BTreeMap<AccountId, AccountRecord>>,
}

impl DiskAccountStore {
    /// Open the store under `root`, loading `accounts.json` if present.
    pub async fn open(root: impl Into<PathBuf>) -> RepoResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let accounts = match tokio::fs::read(root.join(ACCOUNTS_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(root = %root.display(), "opened account store");
        Ok(Self {
            root,
            accounts: Mutex::new(accounts),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.lock().await.len()
    }

    async fn save(&self, accounts: &BTreeMap<AccountId, AccountRecord>) -> RepoResult<()> {
        let bytes = serde_json::to_vec_pretty(accounts)?;
        write_atomic(&self.root.join(ACCOUNTS_FILE), &bytes).await
    }
}

#[async_trait]
impl AccountStore for DiskAccountStore {
    async fn account_exists(&self, id: &AccountId) -> RepoResult<bool> {
        Ok(self.accounts.lock().await.contains_key(id))
    }

    async fn create_account(&self, id: &AccountId, key: &SigningKey) -> RepoResult<()> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(id) {
            return Ok(());
        }
        let mut next = accounts.clone();
        next.insert(id.clone(), new_record(id, key));
        self.save(&next).await?;
        *accounts = next;
        info!(account = %id, "created account");
        Ok(())
    }

    async fn delete_account(&self, id: &AccountId) -> RepoResult<bool> {
        let mut accounts = self.accounts.lock().await;
        if !accounts.contains_key(id) {
            return Ok(false);
        }
        let mut next = accounts.clone();
        next.remove(id);
        self.save(&next).await?;
        *accounts = next;
        info!(account = %id, "deleted account");
        Ok(true)
    }

    async fn storage_location(&self, id: &AccountId) -> RepoResult<PathBuf> {
        Ok(account_dir(&self.root, id))
    }

    async fn get_account(&self, id: &AccountId) -> RepoResult<Option<AccountRecord>> {
        Ok(self.accounts.lock().await.get(id).cloned())
    }
}

/// In-memory account store. Storage locations still resolve under `root`.
pub struct MemoryAccountStore {
    root: PathBuf,
    accounts: RwLock<BTreeMap<AccountId, AccountRecord>>,
}

impl MemoryAccountStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            accounts: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn account_exists(&self, id: &AccountId) -> RepoResult<bool> {
        Ok(self.accounts.read().expect("lock poisoned").contains_key(id))
    }

    async fn create_account(&self, id: &AccountId, key: &SigningKey) -> RepoResult<()> {
        self.accounts
            .write()
            .expect("lock poisoned")
            .entry(id.clone())
            .or_insert_with(|| new_record(id, key));
        Ok(())
    }

    async fn delete_account(&self, id: &AccountId) -> RepoResult<bool> {
        Ok(self.accounts.write().expect("lock poisoned").remove(id).is_some())
    }

    async fn storage_location(&self, id: &AccountId) -> RepoResult<PathBuf> {
        Ok(account_dir(&self.root, id))
    }

    async fn get_account(&self, id: &AccountId) -> RepoResult<Option<AccountRecord>> {
        Ok(self.accounts.read().expect("lock poisoned").get(id).cloned())
    }
}
