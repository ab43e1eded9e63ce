use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Per-account commit revision marker.
///
/// Revisions are strings whose lexicographic order is the commit order of
/// one account's history (timestamp identifiers encode this way). A commit
/// whose revision is not strictly greater than the stored revision has
/// already been applied and is skipped.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    /// Create a revision, rejecting empty or whitespace-bearing strings.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        if value.is_empty() || value.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidRevision(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Revision {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ordering_is_lexicographic() {
        let r1 = Revision::new("3jzfcijpj2z2a").unwrap();
        let r2 = Revision::new("3jzfcijpj2z2b").unwrap();
        assert!(r1 < r2);
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(Revision::new("").is_err());
        assert!(Revision::new("r 1").is_err());
    }

    proptest! {
        #[test]
        fn order_matches_string_order(a in "[a-z2-7]{13}", b in "[a-z2-7]{13}") {
            let ra = Revision::new(a.clone()).unwrap();
            let rb = Revision::new(b.clone()).unwrap();
            prop_assert_eq!(ra.cmp(&rb), a.cmp(&b));
        }
    }
}
