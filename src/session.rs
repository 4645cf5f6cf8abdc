/// Session lifecycle manager.
///
/// Orchestrates registration, login, rotation-on-refresh and revocation
/// over the `TokenStore` collaborator. The manager itself is stateless
/// between calls; everything needed to authorize the next request travels
/// in the returned tokens.
///
/// Refresh tokens form chains: each rotation revokes the presented token,
/// stamps its `replaced_by_token` pointer and persists exactly one live
/// successor. Presenting an already-replaced token is treated as a replay
/// signal and revokes every still-active descendant of that chain.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::auth::{
    generate_refresh_token, hash_password, issue_access_token, verify_password, RefreshToken,
};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::store::{NewUser, TokenStore, User};
use crate::validators::{is_valid_email, is_valid_name, is_valid_username};

const DEFAULT_ROLE: &str = "Customer";

/// Outcome of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of the access token.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

pub struct SessionManager {
    store: Arc<dyn TokenStore>,
    jwt: JwtSettings,
}

impl SessionManager {
    pub fn new(store: Arc<dyn TokenStore>, jwt: JwtSettings) -> Self {
        Self { store, jwt }
    }

    /// Register a new user and grant the requested role, creating the role
    /// first if it does not exist yet.
    pub async fn register(&self, registration: Registration) -> Result<(), AppError> {
        let username = is_valid_username(&registration.username)?;
        let email = is_valid_email(&registration.email)?;
        let first_name = is_valid_name(&registration.first_name)?;
        let last_name = is_valid_name(&registration.last_name)?;
        let password_hash = hash_password(&registration.password)?;

        let user = self
            .store
            .create_user(NewUser {
                username,
                email,
                password_hash,
                first_name,
                last_name,
            })
            .await?;

        let role = if registration.role.trim().is_empty() {
            DEFAULT_ROLE
        } else {
            registration.role.trim()
        };
        self.store.ensure_role(role).await?;
        self.store.assign_role(user.id, role).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(())
    }

    /// Authenticate credentials and open a new refresh-token chain.
    ///
    /// Unknown user and wrong password produce the same denial so the
    /// endpoint cannot be used for username enumeration.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: &str,
    ) -> Result<SessionTokens, AppError> {
        let user = match self.store.find_user_by_username(username).await? {
            Some(user) => user,
            None => {
                tracing::warn!(username = %username, "Login rejected: unknown user");
                return Err(AppError::Auth(AuthError::InvalidCredentials));
            }
        };

        if !verify_password(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Login rejected: password mismatch");
            return Err(AppError::Auth(AuthError::InvalidCredentials));
        }

        let refresh_token = generate_refresh_token(ip);
        self.store
            .insert_refresh_token(user.id, &refresh_token)
            .await?;

        let tokens = self.mint(&user, refresh_token.value).await?;
        tracing::info!(user_id = %user.id, ip = %ip, "Login successful");
        Ok(tokens)
    }

    /// Exchange an active refresh token for a new access token and a
    /// linked successor refresh token.
    ///
    /// The presented token is revoked and its `replaced_by_token` pointer
    /// set in the same atomic store operation that persists the successor;
    /// of two concurrent refreshes on the same value exactly one wins.
    pub async fn refresh(&self, token_value: &str, ip: &str) -> Result<SessionTokens, AppError> {
        let now = Utc::now();

        let presented = match self.store.find_refresh_token(token_value).await? {
            Some(token) => token,
            None => {
                tracing::warn!(ip = %ip, "Refresh rejected: unknown token");
                return Err(AppError::Auth(AuthError::InvalidToken));
            }
        };

        if !presented.is_active(now) {
            if presented.replaced_by_token.is_some() {
                // A replaced token coming back is a replay: someone holds a
                // superseded secret. Kill the whole downstream chain and
                // force a full re-login.
                tracing::warn!(ip = %ip, "Replay of rotated refresh token; revoking chain");
                self.revoke_descendants(&presented, ip, now).await?;
            } else {
                tracing::warn!(ip = %ip, "Refresh rejected: token expired or revoked");
            }
            return Err(AppError::Auth(AuthError::TokenExpiredOrRevoked));
        }

        let user = self
            .store
            .find_user_by_token(token_value)
            .await?
            .ok_or_else(|| AppError::Internal("Refresh token has no owner".to_string()))?;

        let successor = generate_refresh_token(ip);
        match self
            .store
            .rotate_refresh_token(token_value, &successor, ip, now)
            .await
        {
            Ok(()) => {}
            // Lost the race against a concurrent rotation or revoke.
            Err(AppError::Token(_)) => {
                tracing::warn!(user_id = %user.id, ip = %ip, "Refresh lost rotation race");
                return Err(AppError::Auth(AuthError::TokenExpiredOrRevoked));
            }
            Err(other) => return Err(other),
        }

        let tokens = self.mint(&user, successor.value).await?;
        tracing::info!(user_id = %user.id, ip = %ip, "Refresh token rotated");
        Ok(tokens)
    }

    /// Explicitly revoke a refresh token (logout). Leaves
    /// `replaced_by_token` unset, distinguishing this from rotation.
    pub async fn revoke(&self, token_value: &str, ip: &str) -> Result<(), AppError> {
        self.store
            .revoke_refresh_token(token_value, ip, Utc::now())
            .await?;
        tracing::info!(ip = %ip, "Refresh token revoked");
        Ok(())
    }

    /// User profile lookup for authenticated callers.
    pub async fn find_profile(&self, username: &str) -> Result<(User, Vec<String>), AppError> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or(AppError::Auth(AuthError::InvalidToken))?;
        let roles = self.store.roles_for_user(user.id).await?;
        Ok((user, roles))
    }

    async fn mint(&self, user: &User, refresh_value: String) -> Result<SessionTokens, AppError> {
        let roles = self.store.roles_for_user(user.id).await?;
        let access_token = issue_access_token(user, &roles, &self.jwt)?;
        Ok(SessionTokens {
            access_token,
            refresh_token: refresh_value,
            expires_at: Utc::now() + Duration::seconds(self.jwt.access_token_expiry),
        })
    }

    /// Walk the `replaced_by_token` chain from a replayed token and revoke
    /// every descendant that is still active (only the tail can be).
    async fn revoke_descendants(
        &self,
        from: &RefreshToken,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut next = from.replaced_by_token.clone();
        while let Some(value) = next {
            let token = match self.store.find_refresh_token(&value).await? {
                Some(token) => token,
                None => break,
            };
            if token.is_active(now) {
                match self.store.revoke_refresh_token(&value, ip, now).await {
                    Ok(()) => {}
                    // A concurrent revoke got there first; nothing left to do.
                    Err(AppError::Token(_)) => {}
                    Err(other) => return Err(other),
                }
            }
            next = token.replaced_by_token;
        }
        Ok(())
    }
}
