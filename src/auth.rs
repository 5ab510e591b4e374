//! Bearer-credential verification.
//!
//! The verified user id is the tenancy boundary: every storage operation is
//! scoped to it, and no endpoint accepts a caller-supplied user id instead.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid or expired token")]
    Unauthenticated,
}

/// Validates an opaque bearer credential and yields a stable user id.
/// No side effects.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<String, AuthError>;
}

/// Token registry backed by SHA-256 token hashes.
///
/// Raw tokens are never held in memory after construction; lookups hash the
/// presented credential and compare digests.
pub struct TokenRegistry {
    tokens: HashMap<[u8; 32], String>,
}

impl TokenRegistry {
    pub fn new(pairs: &[(String, String)]) -> Self {
        let tokens = pairs
            .iter()
            .map(|(user, token)| (hash_token(token), user.clone()))
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl IdentityVerifier for TokenRegistry {
    async fn verify(&self, credential: &str) -> Result<String, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        self.tokens
            .get(&hash_token(credential))
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
/// Used for provisioning new API users.
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
