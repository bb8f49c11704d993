//! Error types for schoolgate

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::auth::models::Role;
use crate::auth::TokenKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found. Run 'schoolgate init' first.")]
    ConfigNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Token encoding error: {0}")]
    TokenEncode(#[from] jsonwebtoken::errors::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    AccountDeactivated,

    #[error("User not found")]
    UserNotFound,

    #[error("Access token required")]
    MissingToken,

    #[error("{0} token has expired")]
    TokenExpired(TokenKind),

    #[error("Invalid {0} token")]
    InvalidToken(TokenKind),

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Insufficient permissions")]
    Forbidden { required: Vec<Role>, current: Role },

    #[error("Too many login attempts. Try again in {} seconds", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::InvalidCredentials
            | Error::AccountDeactivated
            | Error::UserNotFound
            | Error::MissingToken
            | Error::TokenExpired(_)
            | Error::InvalidToken(_)
            | Error::TokenRevoked => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InvalidCredentials => "INVALID_CREDENTIALS",
            Error::AccountDeactivated => "ACCOUNT_DEACTIVATED",
            Error::UserNotFound => "USER_NOT_FOUND",
            Error::MissingToken => "TOKEN_MISSING",
            Error::TokenExpired(_) => "TOKEN_EXPIRED",
            Error::InvalidToken(_) => "TOKEN_INVALID",
            Error::TokenRevoked => "TOKEN_REVOKED",
            Error::Forbidden { .. } => "FORBIDDEN",
            Error::RateLimited { .. } => "RATE_LIMITED",
            _ => "INTERNAL_ERROR",
        }
    }
}

fn retry_after_secs(retry_after: &Duration) -> u64 {
    // Round up so clients never retry a moment too early
    retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let mut body = if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
            json!({ "error": "Internal server error", "code": code })
        } else {
            json!({ "error": self.to_string(), "code": code })
        };

        let mut retry_header = None;
        match &self {
            Error::Forbidden { required, current } => {
                body["required"] = json!(required);
                body["current"] = json!(current);
            }
            Error::RateLimited { retry_after } => {
                let secs = retry_after_secs(retry_after);
                body["retryAfter"] = Value::from(secs);
                retry_header = Some(HeaderValue::from(secs));
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(value) = retry_header {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, Error>;
