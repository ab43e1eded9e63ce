use std::fmt;

/// Ed25519 secret key of an account. One is minted per account at genesis
/// and persisted hex-encoded beside the repository.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Public half of a [`SigningKey`], as recorded in account records.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Errors from parsing key material.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is not valid hex")]
    InvalidHex,
    #[error("key must be 32 bytes, got {0}")]
    InvalidLength(usize),
    #[error("bytes are not a valid ed25519 public key")]
    InvalidPublicKey,
}

fn decode_32(s: &str) -> Result<[u8; 32], KeyError> {
    let bytes = hex::decode(s.trim()).map_err(|_| KeyError::InvalidHex)?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| KeyError::InvalidLength(len))
}

impl SigningKey {
    /// Mint a fresh key from the OS-seeded thread RNG.
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Ok(Self(ed25519_dalek::SigningKey::from_bytes(&decode_32(s)?)))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }
}

impl VerifyingKey {
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        ed25519_dalek::VerifyingKey::from_bytes(&decode_32(s)?)
            .map(Self)
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}
