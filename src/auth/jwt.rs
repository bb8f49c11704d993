//! JWT access and refresh tokens

use crate::auth::models::UserPayload;
use crate::config::AuthConfig;
use crate::error::{Error, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Longest lifetime a token may be configured with (one year)
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Which of the two token families a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    #[serde(flatten)]
    pub user: UserPayload,
    /// Token family
    pub typ: TokenKind,
    /// Unique token id, used for revocation
    pub jti: String,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
}

impl Claims {
    fn new(user: &UserPayload, typ: TokenKind, ttl: Duration) -> Result<Self> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::Config(format!("{} token lifetime is out of range", typ)))?;
        Ok(Self {
            user: user.clone(),
            typ,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        })
    }
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKeys {
    fn new(secret: &str, ttl_secs: u64) -> Self {
        // Config::validate rejects lifetimes above the cap
        let ttl_secs = ttl_secs.min(MAX_TOKEN_TTL_SECS) as i64;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs),
        }
    }
}

/// Mints and verifies tokens
///
/// Access and refresh tokens are signed with independent secrets, so a leaked
/// access secret cannot be used to forge refresh tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            access: SigningKeys::new(&config.access_secret, config.access_ttl_secs),
            refresh: SigningKeys::new(&config.refresh_secret, config.refresh_ttl_secs),
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of an access token in seconds
    pub fn access_expires_in(&self) -> i64 {
        self.access.ttl.num_seconds()
    }

    pub fn generate_access_token(&self, payload: &UserPayload) -> Result<String> {
        self.generate(payload, TokenKind::Access)
    }

    pub fn generate_refresh_token(&self, payload: &UserPayload) -> Result<String> {
        self.generate(payload, TokenKind::Refresh)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims> {
        self.verify(token, TokenKind::Refresh)
    }

    fn generate(&self, payload: &UserPayload, kind: TokenKind) -> Result<String> {
        let claims = Claims::new(payload, kind, self.keys(kind).ttl)?;
        debug!(
            "Issuing {} token for user {} ({})",
            kind, payload.id, payload.role
        );
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(claims.typ).encoding,
        )?)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Error::TokenExpired(kind),
                _ => {
                    debug!("Rejected {} token: {}", kind, e);
                    Error::InvalidToken(kind)
                }
            })?;

        if claims.typ != kind {
            return Err(Error::InvalidToken(kind));
        }
        Ok(claims)
    }
}
