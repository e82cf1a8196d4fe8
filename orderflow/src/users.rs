//! Users: registration, authentication, and the cached profile read.
//!
//! Password hashing and token issuing are ports ([`PasswordHasher`],
//! [`TokenIssuer`]) so the service never sees a hashing algorithm or a
//! signing key. Raw passwords exist only transiently inside
//! [`UserDirectory::register`] and [`UserDirectory::authenticate`]; the
//! store only ever holds a [`PasswordHash`], and [`UserProfile`] never
//! carries one out.

use std::sync::Arc;

use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

use crate::cache::{self, Cache, CacheKey, CachePolicy};
use crate::errors::{ServiceError, ServiceResult};
use crate::store::{Document, DocumentQuery, DocumentStore};
use crate::types::{EmailAddress, UserId};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Login name; non-empty after trimming, at most 32 characters, unique per
/// store.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 32),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Username(String);

/// Opaque password hash as produced by a [`PasswordHasher`].
#[nutype(
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, AsRef, Deref, Serialize, Deserialize)
)]
pub struct PasswordHash(String);

/// Opaque authentication token as issued by a [`TokenIssuer`].
#[nutype(
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, AsRef, Deref, Display, Serialize, Deserialize)
)]
pub struct AuthToken(String);

/// A credential backend (hasher or token issuer) failed.
///
/// Mapped to [`ServiceError::Transient`] at the service boundary; these
/// failures are never the caller's fault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("credential backend failure: {0}")]
pub struct CredentialError(pub String);

/// Hashes and verifies passwords.
pub trait PasswordHasher: Send + Sync {
    /// Hashes a raw password for storage.
    fn hash(&self, password: &str) -> Result<PasswordHash, CredentialError>;

    /// Whether `password` matches `hash`.
    fn verify(&self, hash: &PasswordHash, password: &str) -> bool;
}

/// Issues authentication tokens for users.
pub trait TokenIssuer: Send + Sync {
    /// Issues a token for the given user.
    fn issue(&self, user_id: &UserId) -> Result<AuthToken, CredentialError>;
}

/// A stored user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned id; `None` until inserted.
    pub id: Option<UserId>,
    /// Unique login name.
    pub username: Username,
    /// Contact address, also used for order confirmations.
    pub email: EmailAddress,
    /// Hash of the password; the raw password is never stored.
    pub password_hash: PasswordHash,
}

impl Document for User {
    type Id = UserId;
    const COLLECTION: &'static str = "users";

    fn generate_id() -> UserId {
        UserId::generate()
    }

    fn id(&self) -> Option<&UserId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: UserId) {
        self.id = Some(id);
    }
}

/// Raw registration input, validated inside [`UserDirectory::register`].
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Requested login name.
    pub username: String,
    /// Contact email address.
    pub email: String,
    /// Raw password; hashed before anything is stored.
    pub password: String,
}

/// The public projection of a user; carries no hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user's id.
    pub id: UserId,
    /// Login name.
    pub username: Username,
    /// Contact address.
    pub email: EmailAddress,
}

/// Query: the single user with the given username.
#[derive(Debug, Clone)]
pub struct UserByUsername {
    username: Username,
}

impl UserByUsername {
    /// Query for one username.
    pub const fn new(username: Username) -> Self {
        Self { username }
    }
}

impl DocumentQuery<User> for UserByUsername {
    fn matches(&self, user: &User) -> bool {
        user.username == self.username
    }
}

/// Account service: register, authenticate, read the profile.
pub struct UserDirectory<S, C> {
    users: Arc<S>,
    cache: Arc<C>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
    policy: CachePolicy,
}

impl<S, C> UserDirectory<S, C>
where
    S: DocumentStore<Doc = User>,
    C: Cache,
{
    /// Creates the directory over its collaborators.
    pub fn new(
        users: Arc<S>,
        cache: Arc<C>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            users,
            cache,
            hasher,
            tokens,
            policy,
        }
    }

    /// Registers a new account.
    ///
    /// Validates username, email, and password length, hashes the password,
    /// and inserts. A taken username surfaces as
    /// [`ServiceError::Conflict`] with the detail `"username already
    /// exists"`, courtesy of the store's unique index.
    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn register(&self, new_user: NewUser) -> ServiceResult<UserId> {
        let username = Username::try_new(new_user.username)
            .map_err(|e| ServiceError::Validation(format!("username: {e}")))?;
        let email = EmailAddress::try_new(new_user.email)
            .map_err(|e| ServiceError::Validation(format!("email: {e}")))?;
        if new_user.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ServiceError::Validation(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }

        let password_hash = self
            .hasher
            .hash(&new_user.password)
            .map_err(|e| ServiceError::Transient(e.to_string()))?;

        let user = User {
            id: None,
            username,
            email,
            password_hash,
        };
        let id = self
            .users
            .insert(user)
            .await
            .map_err(|e| ServiceError::from_store("user", e))?;
        info!(user = %id, "user registered");
        Ok(id)
    }

    /// Authenticates by username and password, returning a fresh token.
    ///
    /// An unknown username is [`ServiceError::NotFound`]; a wrong password
    /// is a validation error saying exactly `"invalid credentials"` and
    /// nothing more.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<AuthToken> {
        let username = Username::try_new(username)
            .map_err(|e| ServiceError::Validation(format!("username: {e}")))?;

        let mut found = self
            .users
            .find(&UserByUsername::new(username.clone()))
            .await
            .map_err(|e| ServiceError::from_store("user", e))?;
        let Some(user) = found.pop() else {
            return Err(ServiceError::NotFound {
                entity: "user",
                id: username.to_string(),
            });
        };

        if !self.hasher.verify(&user.password_hash, password) {
            return Err(ServiceError::Validation("invalid credentials".to_string()));
        }

        let id = user.id.ok_or_else(|| {
            ServiceError::Transient("stored user is missing its id".to_string())
        })?;
        let token = self
            .tokens
            .issue(&id)
            .map_err(|e| ServiceError::Transient(e.to_string()))?;
        info!(user = %id, "user authenticated");
        Ok(token)
    }

    /// Reads a user's profile cache-aside under `user:{id}`.
    ///
    /// The cache holds the full user record; the hash is projected away
    /// here, after the read, so it never leaves the service.
    #[instrument(skip(self))]
    pub async fn profile(&self, id: &UserId) -> ServiceResult<UserProfile> {
        let key = CacheKey::user(id);
        let user = cache::read_through(
            self.cache.as_ref(),
            &key,
            self.policy.entity_ttl,
            self.policy.op_timeout,
            || async {
                self.users
                    .find_by_id(id)
                    .await
                    .map_err(|e| ServiceError::from_store("user", e))?
                    .ok_or_else(|| ServiceError::NotFound {
                        entity: "user",
                        id: id.to_string(),
                    })
            },
        )
        .await?;

        let user_id = user.id.ok_or_else(|| {
            ServiceError::Transient("stored user is missing its id".to_string())
        })?;
        Ok(UserProfile {
            id: user_id,
            username: user.username,
            email: user.email,
        })
    }
}
