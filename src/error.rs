/// Unified error handling for the identity service.
///
/// Every foreseeable failure inside the session lifecycle is converted to a
/// typed `AppError` before it reaches the HTTP layer, so route handlers never
/// inspect internal errors. Authentication denials are deliberately generic
/// towards the caller and detailed only in server-side logs.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Input validation errors, caught at the boundary.
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    InvalidFormat(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication denials. All variants map to 401 and carry no detail
/// beyond what the caller is allowed to learn: "invalid username or
/// password" never says which half was wrong, and a replayed token gets
/// the same message as a merely expired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidCredentials,
    InvalidToken,
    TokenExpiredOrRevoked,
    MissingToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid username or password"),
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::TokenExpiredOrRevoked => write!(f, "Token expired or revoked"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
        }
    }
}

impl StdError for AuthError {}

/// Outcomes of explicit token revocation. Unlike `AuthError` these leak the
/// distinction between "unknown" and "already inactive" on purpose: revoke
/// is an authenticated management call, not a credential check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    NotFound,
    AlreadyInactive,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::NotFound => write!(f, "Token not found"),
            TokenError::AlreadyInactive => write!(f, "Token is already revoked or expired"),
        }
    }
}

impl StdError for TokenError {}

/// Persistence layer faults.
#[derive(Debug)]
pub enum StoreError {
    Duplicate(String),
    NotFound(String),
    Query(String),
    Connection(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Duplicate(msg) => write!(f, "{}", msg),
            StoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StoreError::Query(msg) => write!(f, "Query error: {}", msg),
            StoreError::Connection(msg) => write!(f, "Store connection error: {}", msg),
        }
    }
}

impl StdError for StoreError {}

/// Central error type all operations map into.
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Token(TokenError),
    Store(StoreError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Token(e) => write!(f, "{}", e),
            AppError::Store(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Token(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let error_msg = err.to_string();

        if error_msg.contains("duplicate key") || error_msg.contains("unique constraint") {
            AppError::Store(StoreError::Duplicate("User already exists".to_string()))
        } else if error_msg.contains("no rows") {
            AppError::Store(StoreError::NotFound("Record not found".to_string()))
        } else if error_msg.contains("pool") || error_msg.contains("connect") {
            AppError::Store(StoreError::Connection(error_msg))
        } else {
            AppError::Store(StoreError::Query(error_msg))
        }
    }
}

/// Response body returned for every failed request.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
    pub status: u16,
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Auth(AuthError::MissingToken) => "UNAUTHORIZED",
            AppError::Auth(_) => "AUTH_REJECTED",
            AppError::Token(TokenError::NotFound) => "TOKEN_NOT_FOUND",
            AppError::Token(TokenError::AlreadyInactive) => "TOKEN_INACTIVE",
            AppError::Store(StoreError::Duplicate(_)) => "DUPLICATE_ENTRY",
            AppError::Store(StoreError::NotFound(_)) => "NOT_FOUND",
            AppError::Store(StoreError::Connection(_)) => "SERVICE_UNAVAILABLE",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the caller. Store and internal faults are flattened
    /// to a generic server fault; the detail only goes to the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Duplicate(msg)) => msg.clone(),
            AppError::Store(StoreError::Connection(_)) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Store(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication rejected");
            }
            AppError::Token(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Token revocation rejected");
            }
            AppError::Store(StoreError::Duplicate(_)) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Store(e) => {
                tracing::error!(request_id = request_id, error = %e, "Store error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Token(TokenError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Token(TokenError::AlreadyInactive) => StatusCode::BAD_REQUEST,
            AppError::Store(e) => match e {
                StoreError::Duplicate(_) => StatusCode::CONFLICT,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log(&request_id);

        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            message: self.public_message(),
            code: self.code().to_string(),
            status: status.as_u16(),
        })
    }
}
