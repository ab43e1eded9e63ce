use std::path::{Path, PathBuf};

use relog_types::AccountId;

/// Repository snapshot file inside an account directory.
pub const REPO_FILE: &str = "repo.bin";

/// Signing key file inside an account directory.
pub const KEY_FILE: &str = "signing.key";

/// Storage directory of an account under `root`.
///
/// Accounts are sharded by the first byte of the BLAKE3 hash of their
/// identifier: `<root>/<2 hex>/<escaped id>`. Escaping maps `%` and `:` to
/// percent codes, which keeps distinct identifiers in distinct directories.
pub fn account_dir(root: &Path, account: &AccountId) -> PathBuf {
    let hash = blake3::hash(account.as_str().as_bytes());
    let shard = hex::encode(&hash.as_bytes()[..1]);
    root.join(shard).join(escape(account.as_str()))
}

fn escape(id: &str) -> String {
    let mut out = String::with_capacity(id.len() + 8);
    for c in id.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_is_stable_and_sharded() {
        let account = AccountId::new("did:plc:alice").unwrap();
        let a = account_dir(Path::new("/data"), &account);
        let b = account_dir(Path::new("/data"), &account);
        assert_eq!(a, b);
        assert!(a.ends_with("did%3Aplc%3Aalice"));
        assert_eq!(a.parent().unwrap().parent().unwrap(), Path::new("/data"));
    }

    #[test]
    fn escaping_is_injective() {
        let a = AccountId::new("did:web:a%3Ab").unwrap();
        let b = AccountId::new("did:web:a:b").unwrap();
        assert_ne!(escape(a.as_str()), escape(b.as_str()));
    }
}
