/// Access token issuance and validation.
///
/// Tokens are signed with a symmetric key (HS256) configured at process
/// start. The issuer holds no mutable state; a misconfigured key shows up
/// as a startup failure, not a per-call one.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::store::User;

/// Issue a signed access token carrying the user's identity and roles.
/// Expiry is `now + access_token_expiry` (3 hours by default).
pub fn issue_access_token(
    user: &User,
    roles: &[String],
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = Claims::new(
        user.id,
        user.username.clone(),
        roles.to_vec(),
        config.access_token_expiry,
        config.issuer.clone(),
        config.audience.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate a presented access token and extract its claims.
pub fn validate_access_token(token: &str, config: &JwtSettings) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.set_audience(&[&config.audience]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("JWT validation error: {}", e);
        AppError::Auth(crate::error::AuthError::InvalidToken)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            issuer: "identity-service".to_string(),
            audience: "identity-service-clients".to_string(),
            access_token_expiry: 10800,
            refresh_token_expiry: 604800,
        }
    }

    fn test_user(username: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "unused".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_validate_token() {
        let config = test_config();
        let user = test_user("alice");
        let roles = vec!["Customer".to_string()];

        let token = issue_access_token(&user, &roles, &config).expect("failed to issue token");
        let claims = validate_access_token(&token, &config).expect("failed to validate token");

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.uid, user.id.to_string());
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.iss, "identity-service");
        assert_eq!(claims.aud, "identity-service-clients");
    }

    #[test]
    fn test_invalid_token() {
        let config = test_config();
        assert!(validate_access_token("invalid.token.here", &config).is_err());
    }

    #[test]
    fn test_tampered_token() {
        let config = test_config();
        let token =
            issue_access_token(&test_user("bob"), &[], &config).expect("failed to issue token");

        let tampered = format!("{}X", token);
        assert!(validate_access_token(&tampered, &config).is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = test_config();
        let token =
            issue_access_token(&test_user("bob"), &[], &config).expect("failed to issue token");

        config.issuer = "some-other-service".to_string();
        assert!(validate_access_token(&token, &config).is_err());
    }

    #[test]
    fn test_wrong_audience() {
        let mut config = test_config();
        let token =
            issue_access_token(&test_user("bob"), &[], &config).expect("failed to issue token");

        config.audience = "another-audience".to_string();
        assert!(validate_access_token(&token, &config).is_err());
    }
}
