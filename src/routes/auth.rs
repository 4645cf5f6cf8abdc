/// Authentication routes
///
/// Thin HTTP layer over the session lifecycle manager: registration,
/// login, refresh-token rotation, explicit revocation and the current-user
/// lookup. The client IP is extracted here and passed explicitly into
/// every lifecycle call.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::Claims;
use crate::error::AppError;
use crate::session::{Registration, SessionManager};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Carries the refresh-token value for both refresh and revoke calls.
#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub refresh_token: String,
    /// Access token expiry, RFC 3339.
    pub expiration: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub created_at: String,
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

/// POST /auth/register
///
/// # Errors
/// - 400: validation failure (username, email, password strength)
/// - 409: username already taken
/// - 500: unexpected fault
pub async fn register(
    form: web::Json<RegisterRequest>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    manager
        .register(Registration {
            username: form.username,
            email: form.email,
            password: form.password,
            first_name: form.first_name,
            last_name: form.last_name,
            role: form.role,
        })
        .await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "User registered successfully".to_string(),
    }))
}

/// POST /auth/login
///
/// Returns a signed access token plus the head of a new refresh-token
/// chain. Unknown user and wrong password both come back as a generic
/// 401 to prevent username enumeration.
pub async fn login(
    form: web::Json<LoginRequest>,
    manager: web::Data<SessionManager>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let ip = client_ip(&req);
    let tokens = manager.login(&form.username, &form.password, &ip).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expiration: tokens.expires_at.to_rfc3339(),
        message: "Login successful".to_string(),
    }))
}

/// POST /auth/refresh-token
///
/// Rotates the presented refresh token: the old token is revoked and
/// linked to its successor in one atomic step, and a fresh access token
/// is minted for the owning user.
///
/// # Errors
/// - 401: unknown, expired, revoked or already-replaced token
pub async fn refresh_token(
    form: web::Json<TokenRequest>,
    manager: web::Data<SessionManager>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let ip = client_ip(&req);
    let tokens = manager.refresh(&form.token, &ip).await?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expiration: tokens.expires_at.to_rfc3339(),
        message: "Token refreshed".to_string(),
    }))
}

/// POST /auth/revoke-token
///
/// # Errors
/// - 404: token unknown
/// - 400: token already revoked or expired
pub async fn revoke_token(
    form: web::Json<TokenRequest>,
    manager: web::Data<SessionManager>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let ip = client_ip(&req);
    manager.revoke(&form.token, &ip).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Token revoked successfully".to_string(),
    }))
}

/// GET /api/me
///
/// Requires a valid access token; claims are injected by the JWT
/// middleware.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    manager: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let (user, roles) = manager.find_profile(&claims.sub).await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id.to_string(),
        username: user.username,
        email: user.email,
        roles,
        created_at: user.created_at.to_rfc3339(),
    }))
}
