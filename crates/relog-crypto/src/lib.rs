//! Cryptographic primitives for relog.
//!
//! Provides domain-separated BLAKE3 hashing for block content identifiers
//! and Ed25519 signing keys for account identities.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;
pub mod identity;

pub use hasher::ContentHasher;
pub use identity::{KeyError, SigningKey, VerifyingKey};
