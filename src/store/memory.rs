/// In-memory `TokenStore` backed by a mutex-guarded map.
///
/// Used by the test suite and as a reference for the conditional
/// semantics the Postgres implementation provides transactionally: every
/// trait method takes the lock once, so check-then-act sequences inside a
/// single call are atomic.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::RefreshToken;
use crate::error::{AppError, StoreError, TokenError};
use crate::store::{NewUser, TokenStore, User};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, StoredToken>,
    roles: HashSet<String>,
    user_roles: HashMap<Uuid, BTreeSet<String>>,
}

struct StoredToken {
    user_id: Uuid,
    token: RefreshToken,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-mutation in a test run.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let inner = self.lock();
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_token(&self, token_value: &str) -> Result<Option<User>, AppError> {
        let inner = self.lock();
        Ok(inner
            .tokens
            .get(token_value)
            .and_then(|stored| inner.users.get(&stored.user_id))
            .cloned())
    }

    async fn find_refresh_token(
        &self,
        token_value: &str,
    ) -> Result<Option<RefreshToken>, AppError> {
        let inner = self.lock();
        Ok(inner.tokens.get(token_value).map(|s| s.token.clone()))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut inner = self.lock();
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(AppError::Store(StoreError::Duplicate(
                "User already exists".to_string(),
            )));
        }

        let record = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: Utc::now(),
        };
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn ensure_role(&self, name: &str) -> Result<(), AppError> {
        self.lock().roles.insert(name.to_string());
        Ok(())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<(), AppError> {
        self.lock()
            .user_roles
            .entry(user_id)
            .or_default()
            .insert(role.to_string());
        Ok(())
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let inner = self.lock();
        Ok(inner
            .user_roles
            .get(&user_id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn insert_refresh_token(
        &self,
        user_id: Uuid,
        token: &RefreshToken,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        if inner.tokens.contains_key(&token.value) {
            return Err(AppError::Store(StoreError::Duplicate(
                "Refresh token value collision".to_string(),
            )));
        }
        inner.tokens.insert(
            token.value.clone(),
            StoredToken {
                user_id,
                token: token.clone(),
            },
        );
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_value: &str,
        successor: &RefreshToken,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();

        let user_id = {
            let stored = inner
                .tokens
                .get_mut(old_value)
                .ok_or(AppError::Token(TokenError::NotFound))?;
            if !stored.token.is_active(now) {
                return Err(AppError::Token(TokenError::AlreadyInactive));
            }
            stored.token.revoked_at = Some(now);
            stored.token.revoked_by_ip = Some(ip.to_string());
            stored.token.replaced_by_token = Some(successor.value.clone());
            stored.user_id
        };

        inner.tokens.insert(
            successor.value.clone(),
            StoredToken {
                user_id,
                token: successor.clone(),
            },
        );
        Ok(())
    }

    async fn revoke_refresh_token(
        &self,
        token_value: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut inner = self.lock();
        let stored = inner
            .tokens
            .get_mut(token_value)
            .ok_or(AppError::Token(TokenError::NotFound))?;
        if !stored.token.is_active(now) {
            return Err(AppError::Token(TokenError::AlreadyInactive));
        }
        stored.token.revoked_at = Some(now);
        stored.token.revoked_by_ip = Some(ip.to_string());
        Ok(())
    }
}
