/// Persistence collaborator for the session lifecycle.
///
/// The lifecycle core only ever talks to this narrow trait. The two
/// conditional operations (`rotate_refresh_token`, `revoke_refresh_token`)
/// are the atomicity seam: implementations must apply their
/// read-check-write as a single unit so concurrent refreshes on the same
/// token cannot both mint a live successor.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::RefreshToken;
use crate::error::AppError;

/// Identity record. The password hash is owned by the credential side of
/// the store; the lifecycle core never inspects it directly.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Owner of the refresh token with the given value, if any.
    async fn find_user_by_token(&self, token_value: &str) -> Result<Option<User>, AppError>;

    async fn find_refresh_token(&self, token_value: &str)
        -> Result<Option<RefreshToken>, AppError>;

    /// Insert a new user. Fails with a duplicate error when the username
    /// is already taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;

    /// Idempotent role upsert.
    async fn ensure_role(&self, name: &str) -> Result<(), AppError>;

    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<(), AppError>;

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<String>, AppError>;

    /// Persist a freshly generated token as the head of a new chain.
    async fn insert_refresh_token(
        &self,
        user_id: Uuid,
        token: &RefreshToken,
    ) -> Result<(), AppError>;

    /// Atomically revoke `old_value` (stamping `revoked_at`, `revoked_by_ip`
    /// and `replaced_by_token`) and insert `successor` for the same user.
    /// Succeeds only if the old token is still active at commit time; the
    /// loser of a concurrent rotation gets `TokenError::AlreadyInactive`.
    async fn rotate_refresh_token(
        &self,
        old_value: &str,
        successor: &RefreshToken,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Explicit revocation. Leaves `replaced_by_token` untouched.
    /// Fails with `TokenError::NotFound` for an unknown value and
    /// `TokenError::AlreadyInactive` for a token that is no longer active.
    async fn revoke_refresh_token(
        &self,
        token_value: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;
}
