/// Postgres-backed `TokenStore`.
///
/// Rotation and revocation run inside transactions with conditional
/// updates guarding the active check, so two concurrent refreshes on the
/// same token value commit at most one successor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::RefreshToken;
use crate::error::{AppError, TokenError};
use crate::store::{NewUser, TokenStore, User};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type UserRow = (
    Uuid,
    String,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
);

type TokenRow = (
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
);

fn user_from_row(row: UserRow) -> User {
    User {
        id: row.0,
        username: row.1,
        email: row.2,
        password_hash: row.3,
        first_name: row.4,
        last_name: row.5,
        created_at: row.6,
    }
}

fn token_from_row(row: TokenRow) -> RefreshToken {
    RefreshToken {
        value: row.0,
        created_at: row.1,
        expires_at: row.2,
        created_by_ip: row.3,
        revoked_at: row.4,
        revoked_by_ip: row.5,
        replaced_by_token: row.6,
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, first_name, last_name, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn find_user_by_token(&self, token_value: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.email, u.password_hash,
                   u.first_name, u.last_name, u.created_at
            FROM users u
            JOIN refresh_tokens t ON t.user_id = u.id
            WHERE t.value = $1
            "#,
        )
        .bind(token_value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn find_refresh_token(
        &self,
        token_value: &str,
    ) -> Result<Option<RefreshToken>, AppError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT value, created_at, expires_at, created_by_ip,
                   revoked_at, revoked_by_ip, replaced_by_token
            FROM refresh_tokens
            WHERE value = $1
            "#,
        )
        .bind(token_value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(token_from_row))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, first_name, last_name, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at,
        })
    }

    async fn ensure_role(&self, name: &str) -> Result<(), AppError> {
        sqlx::query("INSERT INTO roles (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_name)
            VALUES ($1, $2)
            ON CONFLICT (user_id, role_name) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let roles = sqlx::query_scalar::<_, String>(
            "SELECT role_name FROM user_roles WHERE user_id = $1 ORDER BY role_name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn insert_refresh_token(
        &self,
        user_id: Uuid,
        token: &RefreshToken,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (value, user_id, created_at, expires_at, created_by_ip)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&token.value)
        .bind(user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(&token.created_by_ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_value: &str,
        successor: &RefreshToken,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        // The WHERE guard makes the revoke conditional on the token still
        // being active; a concurrent rotation already committed means zero
        // rows come back and the whole transaction rolls back.
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1, revoked_by_ip = $2, replaced_by_token = $3
            WHERE value = $4 AND revoked_at IS NULL AND expires_at > $1
            RETURNING user_id
            "#,
        )
        .bind(now)
        .bind(ip)
        .bind(&successor.value)
        .bind(old_value)
        .fetch_optional(&mut tx)
        .await?;

        let user_id = match user_id {
            Some(id) => id,
            None => {
                tx.rollback().await?;
                return Err(AppError::Token(TokenError::AlreadyInactive));
            }
        };

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (value, user_id, created_at, expires_at, created_by_ip)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&successor.value)
        .bind(user_id)
        .bind(successor.created_at)
        .bind(successor.expires_at)
        .bind(&successor.created_by_ip)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn revoke_refresh_token(
        &self,
        token_value: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (Option<DateTime<Utc>>, DateTime<Utc>)>(
            "SELECT revoked_at, expires_at FROM refresh_tokens WHERE value = $1 FOR UPDATE",
        )
        .bind(token_value)
        .fetch_optional(&mut tx)
        .await?;

        match row {
            None => {
                tx.rollback().await?;
                Err(AppError::Token(TokenError::NotFound))
            }
            Some((revoked_at, expires_at)) if revoked_at.is_some() || expires_at <= now => {
                tx.rollback().await?;
                Err(AppError::Token(TokenError::AlreadyInactive))
            }
            Some(_) => {
                sqlx::query(
                    "UPDATE refresh_tokens SET revoked_at = $1, revoked_by_ip = $2 WHERE value = $3",
                )
                .bind(now)
                .bind(ip)
                .bind(token_value)
                .execute(&mut tx)
                .await?;

                tx.commit().await?;
                Ok(())
            }
        }
    }
}
