//! HTTP API server

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{
    hash_password, require_auth, require_role, AuthGate, InMemoryUserStore, LoginThrottle,
    RevocationList, Role, TokenIssuer, TrustProxy, UserStore,
};
use crate::config::Config;
use crate::error::Result;

use super::routes;

/// Roles allowed to browse the user directory
const DIRECTORY_ROLES: &[Role] = &[Role::Admin, Role::Registrar];

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub gate: AuthGate,
    pub throttle: LoginThrottle,
    /// Hash checked when a login names an unknown account, so a miss costs the
    /// same bcrypt work as a wrong password
    dummy_hash: String,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, users: Arc<dyn UserStore>) -> Result<Self> {
        let gate = AuthGate::new(TokenIssuer::new(&config.auth), RevocationList::new());
        let throttle = LoginThrottle::new(config.throttle.policy());
        let dummy_hash =
            hash_password(&uuid::Uuid::new_v4().to_string(), config.auth.bcrypt_cost)?;
        Ok(Self {
            config,
            users,
            gate,
            throttle,
            dummy_hash,
        })
    }

    /// Build state with an in-memory user store seeded from `config.users`
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let users = InMemoryUserStore::from_seeds(&config.users)?;
        Self::new(config, Arc::new(users))
    }

    pub(crate) fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.gate.issuer
    }

    pub fn revoked(&self) -> &RevocationList {
        &self.gate.revoked
    }
}

impl FromRef<SharedState> for TrustProxy {
    fn from_ref(state: &SharedState) -> Self {
        TrustProxy(state.config.server.trust_proxy)
    }
}

/// Run the HTTP API server
pub async fn run_server(config: Config, host: &str, port: u16) -> Result<()> {
    let sweep_every = Duration::from_secs(config.throttle.sweep_interval_secs.max(1));
    let state: SharedState = Arc::new(AppState::from_config(config)?);
    info!("Loaded {} user account(s)", state.users.list().await?.len());

    let sweeper = start_sweeper(state.clone(), sweep_every);
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Periodically drop stale throttle entries and expired revocations
pub fn start_sweeper(state: SharedState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let throttled = state.throttle.sweep().await;
            let revoked = state.revoked().purge_expired().await;
            if throttled > 0 || revoked > 0 {
                debug!(
                    "Swept {} throttle entries and {} revoked tokens",
                    throttled, revoked
                );
            }
        }
    })
}

/// Create the router with all routes
pub fn create_router(state: SharedState) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(routes::me))
        .route("/api/auth/change-password", patch(routes::change_password))
        .merge(
            Router::new()
                .route("/api/users", get(routes::list_users))
                .route_layer(middleware::from_fn(require_role(DIRECTORY_ROLES))),
        )
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_auth,
        ));

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/auth/login", post(routes::login))
        .route("/api/auth/refresh", post(routes::refresh))
        .route("/api/auth/logout", post(routes::logout))
        .merge(protected)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
