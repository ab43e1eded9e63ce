use relog_types::Cid;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"relog-block-v1"`) that is
/// prepended to every hash computation, so that bytes hashed for one
/// purpose can never collide with the same bytes hashed for another.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for repository blocks (records, commit nodes).
    pub const BLOCK: Self = Self {
        domain: "relog-block-v1",
    };
    /// Hasher for blob content referenced from records.
    pub const BLOB: Self = Self {
        domain: "relog-blob-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Cid {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Cid::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected content identifier.
    pub fn verify(&self, data: &[u8], expected: &Cid) -> bool {
        self.hash(data) == *expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::BLOCK.hash(data), ContentHasher::BLOCK.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(ContentHasher::BLOCK.hash(data), ContentHasher::BLOB.hash(data));
    }

    #[test]
    fn verify_correct_and_tampered_data() {
        let cid = ContentHasher::BLOCK.hash(b"original");
        assert!(ContentHasher::BLOCK.verify(b"original", &cid));
        assert!(!ContentHasher::BLOCK.verify(b"tampered", &cid));
    }

    #[test]
    fn domain_tag_prefixes_input() {
        let raw = Cid::from_hash(*blake3::hash(b"test").as_bytes());
        assert_ne!(raw, ContentHasher::BLOCK.hash(b"test"));
        let tagged = Cid::from_hash(*blake3::hash(b"relog-block-v1:test").as_bytes());
        assert_eq!(tagged, ContentHasher::BLOCK.hash(b"test"));
    }
}
