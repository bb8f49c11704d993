//! Authentication middleware and extractors

use crate::auth::jwt::{Claims, TokenIssuer};
use crate::auth::models::Role;
use crate::auth::revocation::RevocationList;
use crate::error::{Error, Result};
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::warn;

/// Everything needed to validate an access token
#[derive(Clone)]
pub struct AuthGate {
    pub issuer: TokenIssuer,
    pub revoked: RevocationList,
}

impl AuthGate {
    pub fn new(issuer: TokenIssuer, revoked: RevocationList) -> Self {
        Self { issuer, revoked }
    }

    /// Validate the bearer token carried by `headers`
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Claims> {
        let token = bearer_token(headers)?;
        let claims = self.issuer.verify_access_token(token)?;
        if self.revoked.is_revoked(&claims.jti).await {
            return Err(Error::TokenRevoked);
        }
        Ok(claims)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(Error::MissingToken)
}

/// Middleware for requiring a valid access token
///
/// On success the decoded [`Claims`] are stored in the request extensions.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, Error> {
    let claims = gate.authenticate(req.headers()).await.inspect_err(|e| {
        warn!("Rejected request to {}: {}", req.uri().path(), e);
    })?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Check the authenticated user's role against an allow-list
pub fn authorize(claims: Option<&Claims>, allowed: &[Role]) -> Result<()> {
    let claims = claims.ok_or(Error::MissingToken)?;
    if allowed.contains(&claims.user.role) {
        Ok(())
    } else {
        Err(Error::Forbidden {
            required: allowed.to_vec(),
            current: claims.user.role,
        })
    }
}

/// Middleware restricting a route to `allowed` roles
///
/// Must run after [`require_auth`]:
///
/// ```ignore
/// router.route_layer(axum::middleware::from_fn(require_role(&[Role::Admin])))
/// ```
pub fn require_role(
    allowed: &'static [Role],
) -> impl Fn(Request, Next) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let decision = authorize(req.extensions().get::<Claims>(), allowed);
            match decision {
                Ok(()) => next.run(req).await,
                Err(e) => {
                    warn!("Denied access to {}: {}", req.uri().path(), e);
                    e.into_response()
                }
            }
        })
    }
}

/// Claims of the authenticated user, for handlers behind [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or(Error::MissingToken)
    }
}

/// Whether `X-Forwarded-For` comes from a proxy we control
///
/// Pulled from router state via [`FromRef`], see `server.trust_proxy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustProxy(pub bool);

/// Identifier of the calling client, used as the throttle key
///
/// The peer address by default. The first `X-Forwarded-For` hop is used only
/// when [`TrustProxy`] is set, since clients can put anything in that header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl ClientKey {
    fn from_parts(parts: &Parts, trust_proxy: bool) -> Self {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| trust_proxy && !ip.is_empty());

        let key = match forwarded {
            Some(ip) => ip.to_string(),
            None => parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        };
        ClientKey(key)
    }
}

impl<S> FromRequestParts<S> for ClientKey
where
    S: Send + Sync,
    TrustProxy: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let TrustProxy(trust_proxy) = TrustProxy::from_ref(state);
        Ok(ClientKey::from_parts(parts, trust_proxy))
    }
}
