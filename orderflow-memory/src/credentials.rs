//! Credential fakes: a see-through hasher and a deterministic token
//! issuer.
//!
//! These satisfy the [`PasswordHasher`] and [`TokenIssuer`] ports without
//! any real cryptography, which keeps registration and login flows fast
//! and assertable in tests. Nothing here belongs near production traffic.

use orderflow::{AuthToken, CredentialError, PasswordHash, PasswordHasher, TokenIssuer, UserId};

/// Hasher that stores the password behind a marker prefix.
///
/// `verify` is an equality check, so tests can register and authenticate
/// without pulling in a real KDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextHasher;

impl PlainTextHasher {
    /// Creates the hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PasswordHasher for PlainTextHasher {
    fn hash(&self, password: &str) -> Result<PasswordHash, CredentialError> {
        PasswordHash::try_new(format!("plain:{password}"))
            .map_err(|e| CredentialError(e.to_string()))
    }

    fn verify(&self, hash: &PasswordHash, password: &str) -> bool {
        hash.as_ref()
            .strip_prefix("plain:")
            .map_or(false, |stored| stored == password)
    }
}

/// Token issuer that derives the token from the user id.
///
/// Tokens look like `{prefix}-{user_id}`, so a test that knows the id
/// knows the token.
#[derive(Debug, Clone)]
pub struct StaticTokenIssuer {
    prefix: String,
}

impl StaticTokenIssuer {
    /// Creates an issuer with the given token prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for StaticTokenIssuer {
    fn default() -> Self {
        Self::new("token")
    }
}

impl TokenIssuer for StaticTokenIssuer {
    fn issue(&self, user_id: &UserId) -> Result<AuthToken, CredentialError> {
        AuthToken::try_new(format!("{}-{}", self.prefix, user_id))
            .map_err(|e| CredentialError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_hashed_password_verifies_and_a_wrong_one_does_not() {
        let hasher = PlainTextHasher::new();
        let hash = hasher.hash("secret1").expect("hashing succeeds");

        assert!(hasher.verify(&hash, "secret1"));
        assert!(!hasher.verify(&hash, "secret2"));
    }

    #[test]
    fn the_hash_is_not_the_raw_password() {
        let hasher = PlainTextHasher::new();
        let hash = hasher.hash("secret1").expect("hashing succeeds");
        assert_ne!(hash.as_ref(), "secret1");
    }

    #[test]
    fn tokens_are_deterministic_per_user() {
        let issuer = StaticTokenIssuer::default();
        let user = UserId::generate();

        let first = issuer.issue(&user).expect("issuing succeeds");
        let second = issuer.issue(&user).expect("issuing succeeds");

        assert_eq!(first, second);
        assert_eq!(first.to_string(), format!("token-{user}"));
    }
}
