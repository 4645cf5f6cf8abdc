/// JWT claim set for access tokens (RFC 7519 plus role claims).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// User id (UUID string)
    pub uid: String,
    /// Token identifier, fresh per issuance so two tokens minted for the
    /// same user in the same instant are still distinguishable
    pub jti: String,
    /// Role names granted to the subject
    pub roles: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        username: String,
        roles: Vec<String>,
        expiry_seconds: i64,
        issuer: String,
        audience: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: username,
            uid: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            roles,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            aud: audience,
        }
    }

    /// Extract the user id from the claims.
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.uid)
            .map_err(|_| AppError::Internal("Invalid user id in token".to_string()))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> Claims {
        Claims::new(
            Uuid::new_v4(),
            "alice".to_string(),
            vec!["Customer".to_string(), "Admin".to_string()],
            10800,
            "identity-service".to_string(),
            "identity-service-clients".to_string(),
        )
    }

    #[test]
    fn test_claims_creation() {
        let claims = sample_claims();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, "identity-service");
        assert!(claims.exp > claims.iat);
        assert!(claims.has_role("Admin"));
        assert!(!claims.has_role("Auditor"));
    }

    #[test]
    fn test_token_ids_are_fresh() {
        let a = sample_claims();
        let b = sample_claims();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = sample_claims();
        claims.uid = "not-a-uuid".to_string();
        assert!(claims.user_id().is_err());
    }
}
