//! HTTP API tests
//! Drives the router in-process, no listening socket needed
//!
//! Run with: cargo test --test api_tests

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use schoolgate::api::{create_router, AppState, SharedState};
use schoolgate::auth::{hash_password, Claims, Role, ThrottleState, TokenKind, UserPayload};
use schoolgate::config::{Config, UserSeed};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::ServiceExt;

const ACCESS_SECRET: &str = "api-test-access-secret";
const REFRESH_SECRET: &str = "api-test-refresh-secret";

fn seed(id: i64, email: &str, role: Role, password: &str, active: bool) -> UserSeed {
    UserSeed {
        id,
        email: email.to_string(),
        name: format!("User {}", id),
        role,
        password_hash: hash_password(password, 4).expect("Failed to hash password"),
        active,
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.access_secret = ACCESS_SECRET.to_string();
    config.auth.refresh_secret = REFRESH_SECRET.to_string();
    config.auth.bcrypt_cost = 4;
    config.users = vec![
        seed(1, "admin@school.edu", Role::Admin, "AdminPass1", true),
        seed(2, "teacher@school.edu", Role::Teacher, "TeachPass1", true),
        seed(3, "former@school.edu", Role::Student, "Former123", false),
        seed(4, "registrar@school.edu", Role::Registrar, "Records99", true),
    ];
    config
}

fn app_with(config: Config) -> (Router, SharedState) {
    let state = Arc::new(AppState::from_config(config).expect("Invalid test config"));
    (create_router(state.clone()), state)
}

fn test_app() -> (Router, SharedState) {
    app_with(test_config())
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.expect("Router failed");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Body is not JSON")
    };
    (status, headers, body)
}

/// JSON request arriving from `client_ip`, as `serve` would see it
fn json_request(method: Method, uri: &str, body: Value, client_ip: &str) -> Request<Body> {
    let ip: IpAddr = client_ip.parse().expect("Invalid test IP");
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::new(ip, 40000)));
    req
}

fn forwarded_login(password: &str, peer_ip: &str, forwarded_for: &str) -> Request<Body> {
    let mut req = json_request(
        Method::POST,
        "/api/auth/login",
        json!({ "email": "admin@school.edu", "password": password }),
        peer_ip,
    );
    req.headers_mut()
        .insert("x-forwarded-for", forwarded_for.parse().unwrap());
    req
}

fn authed(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn login(app: &Router, email: &str, password: &str, client_ip: &str) -> (StatusCode, Value) {
    let req = json_request(
        Method::POST,
        "/api/auth/login",
        json!({ "email": email, "password": password }),
        client_ip,
    );
    let (status, _, body) = send(app, req).await;
    (status, body)
}

async fn access_token_for(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = login(app, email, password, "198.51.100.1").await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app();
    let req = Request::get("/api/health").body(Body::empty()).unwrap();
    let (status, _, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_login_returns_tokens() {
    let (app, state) = test_app();
    let (status, body) = login(&app, "Admin@School.edu", "AdminPass1", "10.1.0.1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expiresIn"], 900);
    assert_eq!(body["user"]["email"], "admin@school.edu");
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["roleId"], 1);
    assert!(body["user"].get("passwordHash").is_none());

    let access = state
        .issuer()
        .verify_access_token(body["accessToken"].as_str().unwrap())
        .unwrap();
    assert_eq!(access.user, UserPayload::new(1, "admin@school.edu", Role::Admin));

    let refresh = state
        .issuer()
        .verify_refresh_token(body["refreshToken"].as_str().unwrap())
        .unwrap();
    assert_eq!(refresh.user, access.user);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let (app, _) = test_app();

    let (status, body) = login(&app, "admin@school.edu", "WrongPass1", "10.1.0.2").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");

    let (status, body) = login(&app, "nobody@school.edu", "AdminPass1", "10.1.0.2").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn test_login_rejects_deactivated_account() {
    let (app, _) = test_app();
    let (status, body) = login(&app, "former@school.edu", "Former123", "10.1.0.3").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACCOUNT_DEACTIVATED");
}

#[tokio::test]
async fn test_login_validation_errors() {
    let (app, _) = test_app();

    let (status, body) = login(&app, "not-an-email", "AdminPass1", "10.1.0.4").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = login(&app, "admin@school.edu", "", "10.1.0.4").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = json_request(
        Method::POST,
        "/api/auth/login",
        json!({ "email": "admin@school.edu" }),
        "10.1.0.4",
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_sixth_attempt_is_throttled_even_with_correct_password() {
    let (app, _) = test_app();
    let ip = "203.0.113.7";

    for attempt in 1..=5 {
        let (status, _) = login(&app, "admin@school.edu", "WrongPass1", ip).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "attempt {}", attempt);
    }

    let req = json_request(
        Method::POST,
        "/api/auth/login",
        json!({ "email": "admin@school.edu", "password": "AdminPass1" }),
        ip,
    );
    let (status, headers, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
    assert!(body["retryAfter"].as_u64().unwrap() > 0);
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Other clients are unaffected
    let (status, _) = login(&app, "admin@school.edu", "AdminPass1", "203.0.113.8").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_forwarded_header_does_not_reset_throttle() {
    let (app, _) = test_app();

    for i in 0..5 {
        let req = forwarded_login("WrongPass1", "203.0.113.50", &format!("1.2.3.{}", i));
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "attempt {}", i);
    }

    let req = forwarded_login("AdminPass1", "203.0.113.50", "1.2.3.99");
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_trusted_proxy_keys_on_forwarded_client() {
    let mut config = test_config();
    config.server.trust_proxy = true;
    let (app, state) = app_with(config);
    let proxy = "10.0.0.1";

    for _ in 0..5 {
        let req = forwarded_login("WrongPass1", proxy, "198.51.100.7");
        send(&app, req).await;
    }
    let (status, _, _) = send(&app, forwarded_login("AdminPass1", proxy, "198.51.100.7")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // Another client behind the same proxy is tracked separately
    let (status, _, _) = send(&app, forwarded_login("AdminPass1", proxy, "198.51.100.8")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.throttle.state(proxy).await, ThrottleState::Fresh);
}

#[tokio::test]
async fn test_successful_login_clears_attempts() {
    let (app, state) = test_app();
    let ip = "203.0.113.20";

    for _ in 0..4 {
        login(&app, "teacher@school.edu", "WrongPass1", ip).await;
    }
    assert_eq!(state.throttle.state(ip).await, ThrottleState::Counting { count: 4 });

    let (status, _) = login(&app, "teacher@school.edu", "TeachPass1", ip).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.throttle.state(ip).await, ThrottleState::Fresh);

    for _ in 0..5 {
        let (status, _) = login(&app, "teacher@school.edu", "WrongPass1", ip).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = login(&app, "teacher@school.edu", "WrongPass1", ip).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_protected_route_token_errors() {
    let (app, _) = test_app();

    let req = Request::get("/api/auth/me").body(Body::empty()).unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_MISSING");

    let req = Request::get("/api/auth/me")
        .header(header::AUTHORIZATION, "Token abc")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_MISSING");

    let (status, _, body) = send(&app, authed(Method::GET, "/api/auth/me", "garbage", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_INVALID");

    let now = chrono::Utc::now().timestamp();
    let expired = Claims {
        user: UserPayload::new(1, "admin@school.edu", Role::Admin),
        typ: TokenKind::Access,
        jti: "expired".to_string(),
        iat: now - 2000,
        exp: now - 1100,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &expired,
        &jsonwebtoken::EncodingKey::from_secret(ACCESS_SECRET.as_bytes()),
    )
    .unwrap();
    let (status, _, body) = send(&app, authed(Method::GET, "/api/auth/me", &token, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_me_returns_current_user() {
    let (app, _) = test_app();
    let token = access_token_for(&app, "teacher@school.edu", "TeachPass1").await;

    let (status, _, body) = send(&app, authed(Method::GET, "/api/auth/me", &token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], 2);
    assert_eq!(body["user"]["role"], "teacher");
}

#[tokio::test]
async fn test_role_gate() {
    let (app, _) = test_app();

    let teacher = access_token_for(&app, "teacher@school.edu", "TeachPass1").await;
    let (status, _, body) = send(&app, authed(Method::GET, "/api/users", &teacher, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["required"], json!(["admin", "registrar"]));
    assert_eq!(body["current"], "teacher");

    let admin = access_token_for(&app, "admin@school.edu", "AdminPass1").await;
    let (status, _, body) = send(&app, authed(Method::GET, "/api/users", &admin, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 4);

    let registrar = access_token_for(&app, "registrar@school.edu", "Records99").await;
    let (status, _, _) = send(&app, authed(Method::GET, "/api/users", &registrar, None)).await;
    assert_eq!(status, StatusCode::OK);

    let req = Request::get("/api/users").body(Body::empty()).unwrap();
    let (status, _, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_issues_new_access_token() {
    let (app, state) = test_app();
    let (_, session) = login(&app, "teacher@school.edu", "TeachPass1", "10.2.0.1").await;

    let req = json_request(
        Method::POST,
        "/api/auth/refresh",
        json!({ "refreshToken": session["refreshToken"] }),
        "10.2.0.1",
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expiresIn"], 900);

    let claims = state
        .issuer()
        .verify_access_token(body["accessToken"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.user.email, "teacher@school.edu");
}

#[tokio::test]
async fn test_refresh_rejects_wrong_tokens() {
    let (app, state) = test_app();
    let (_, session) = login(&app, "teacher@school.edu", "TeachPass1", "10.2.0.2").await;

    // An access token is not a refresh token
    let req = json_request(
        Method::POST,
        "/api/auth/refresh",
        json!({ "refreshToken": session["accessToken"] }),
        "10.2.0.2",
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_INVALID");

    // Deactivated accounts cannot renew
    let former = state
        .issuer()
        .generate_refresh_token(&UserPayload::new(3, "former@school.edu", Role::Student))
        .unwrap();
    let req = json_request(
        Method::POST,
        "/api/auth/refresh",
        json!({ "refreshToken": former }),
        "10.2.0.2",
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "ACCOUNT_DEACTIVATED");

    // Unknown accounts cannot renew either
    let ghost = state
        .issuer()
        .generate_refresh_token(&UserPayload::new(99, "ghost@school.edu", Role::Parent))
        .unwrap();
    let req = json_request(
        Method::POST,
        "/api/auth/refresh",
        json!({ "refreshToken": ghost }),
        "10.2.0.2",
    );
    let (status, _, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_tokens() {
    let (app, state) = test_app();
    let (_, session) = login(&app, "admin@school.edu", "AdminPass1", "10.3.0.1").await;
    let access = session["accessToken"].as_str().unwrap();

    let req = authed(
        Method::POST,
        "/api/auth/logout",
        access,
        Some(json!({ "refreshToken": session["refreshToken"] })),
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");
    assert_eq!(state.revoked().len().await, 2);

    let (status, _, body) = send(&app, authed(Method::GET, "/api/auth/me", access, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_REVOKED");

    let req = json_request(
        Method::POST,
        "/api/auth/refresh",
        json!({ "refreshToken": session["refreshToken"] }),
        "10.3.0.1",
    );
    let (status, _, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn test_logout_without_credentials_succeeds() {
    let (app, _) = test_app();
    let req = Request::post("/api/auth/logout").body(Body::empty()).unwrap();
    let (status, _, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");
}

#[tokio::test]
async fn test_change_password_flow() {
    let (app, _) = test_app();
    let token = access_token_for(&app, "teacher@school.edu", "TeachPass1").await;
    let uri = "/api/auth/change-password";

    let body = json!({ "currentPassword": "Wrong0000", "newPassword": "NewLesson22" });
    let (status, _, resp) = send(&app, authed(Method::PATCH, uri, &token, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "Current password is incorrect");

    let body = json!({ "currentPassword": "TeachPass1", "newPassword": "short" });
    let (status, _, _) = send(&app, authed(Method::PATCH, uri, &token, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "currentPassword": "TeachPass1", "newPassword": "TeachPass1" });
    let (status, _, _) = send(&app, authed(Method::PATCH, uri, &token, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "currentPassword": "TeachPass1", "newPassword": "NewLesson22" });
    let (status, _, resp) = send(&app, authed(Method::PATCH, uri, &token, Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["message"], "Password changed successfully");

    let (status, _) = login(&app, "teacher@school.edu", "TeachPass1", "10.4.0.1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "teacher@school.edu", "NewLesson22", "10.4.0.1").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_requires_auth() {
    let (app, _) = test_app();
    let req = json_request(
        Method::PATCH,
        "/api/auth/change-password",
        json!({ "currentPassword": "TeachPass1", "newPassword": "NewLesson22" }),
        "10.4.0.2",
    );
    let (status, _, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "TOKEN_MISSING");
}
