//! API route handlers

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::{info, warn};

use super::server::SharedState;
use crate::auth::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
    RefreshRequest, RefreshResponse, UserInfo,
};
use crate::auth::{hash_password, verify_password, AuthUser, ClientKey, ThrottleDecision};
use crate::error::{Error, Result};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")
        .expect("Invalid regex pattern - this is a bug in the codebase")
});

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserInfo>,
}

fn validation_error(rejection: JsonRejection) -> Error {
    Error::Validation(rejection.body_text())
}

/// Run CPU-heavy work (bcrypt) off the async workers
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("Blocking task failed: {}", e)))?
}

async fn check_password(password: String, hash: String) -> Result<bool> {
    run_blocking(move || verify_password(&password, &hash)).await
}

fn validate_login(req: &LoginRequest) -> Result<()> {
    if !EMAIL_RE.is_match(req.email.trim()) {
        return Err(Error::Validation("A valid email address is required".to_string()));
    }
    if req.password.is_empty() {
        return Err(Error::Validation("Password is required".to_string()));
    }
    Ok(())
}

// Health check

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

// Session routes

pub async fn login(
    State(state): State<SharedState>,
    ClientKey(client): ClientKey,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let Json(req) = payload.map_err(validation_error)?;
    validate_login(&req)?;

    if let ThrottleDecision::Blocked { retry_after } = state.throttle.check(&client).await {
        return Err(Error::RateLimited { retry_after });
    }

    let Some(user) = state.users.find_by_email(&req.email).await? else {
        check_password(req.password, state.dummy_hash().to_string()).await?;
        warn!("Failed login from {}: unknown account", client);
        return Err(Error::InvalidCredentials);
    };

    if !check_password(req.password, user.password_hash.clone()).await? {
        warn!("Failed login from {} for user {}", client, user.id);
        return Err(Error::InvalidCredentials);
    }

    if !user.active {
        warn!("Login refused for deactivated user {}", user.id);
        return Err(Error::AccountDeactivated);
    }

    state.throttle.clear_rate_limit(&client).await;

    let payload = user.payload();
    let access_token = state.issuer().generate_access_token(&payload)?;
    let refresh_token = state.issuer().generate_refresh_token(&payload)?;

    info!("User {} ({}) logged in", user.id, user.role);

    Ok(Json(LoginResponse {
        user: user.into(),
        access_token,
        refresh_token,
        expires_in: state.issuer().access_expires_in(),
    }))
}

pub async fn refresh(
    State(state): State<SharedState>,
    payload: std::result::Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<RefreshResponse>> {
    let Json(req) = payload.map_err(validation_error)?;

    let claims = state.issuer().verify_refresh_token(&req.refresh_token)?;
    if state.revoked().is_revoked(&claims.jti).await {
        return Err(Error::TokenRevoked);
    }

    // Mint from the stored record so role changes and deactivation take effect
    let user = state
        .users
        .find_by_id(claims.user.id)
        .await?
        .ok_or(Error::UserNotFound)?;
    if !user.active {
        return Err(Error::AccountDeactivated);
    }

    let access_token = state.issuer().generate_access_token(&user.payload())?;

    Ok(Json(RefreshResponse {
        access_token,
        expires_in: state.issuer().access_expires_in(),
    }))
}

/// Revoke whatever valid tokens the client presents; always succeeds
pub async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<MessageResponse> {
    let req: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_default()
    };

    if let Ok(claims) = state.gate.authenticate(&headers).await {
        state.revoked().revoke_claims(&claims).await;
        info!("User {} logged out", claims.user.id);
    }

    if let Some(token) = req.refresh_token {
        if let Ok(claims) = state.issuer().verify_refresh_token(&token) {
            state.revoked().revoke_claims(&claims).await;
        }
    }

    Json(MessageResponse::new("Logged out successfully"))
}

// Account routes

pub async fn change_password(
    State(state): State<SharedState>,
    AuthUser(claims): AuthUser,
    payload: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(req) = payload.map_err(validation_error)?;

    let user = state
        .users
        .find_by_id(claims.user.id)
        .await?
        .ok_or(Error::UserNotFound)?;
    if !user.active {
        return Err(Error::AccountDeactivated);
    }

    if !check_password(req.current_password.clone(), user.password_hash).await? {
        return Err(Error::Validation("Current password is incorrect".to_string()));
    }

    state.config.auth.password_policy().validate(&req.new_password)?;
    if req.new_password == req.current_password {
        return Err(Error::Validation(
            "New password must differ from the current password".to_string(),
        ));
    }

    let cost = state.config.auth.bcrypt_cost;
    let new_password = req.new_password;
    let new_hash = run_blocking(move || hash_password(&new_password, cost)).await?;
    state.users.update_password_hash(user.id, new_hash).await?;

    info!("User {} changed their password", user.id);

    Ok(Json(MessageResponse::new("Password changed successfully")))
}

pub async fn me(
    State(state): State<SharedState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MeResponse>> {
    let user = state
        .users
        .find_by_id(claims.user.id)
        .await?
        .ok_or(Error::UserNotFound)?;
    Ok(Json(MeResponse { user: user.into() }))
}

pub async fn list_users(State(state): State<SharedState>) -> Result<Json<UsersResponse>> {
    let users = state.users.list().await?;
    Ok(Json(UsersResponse {
        users: users.into_iter().map(UserInfo::from).collect(),
    }))
}
