//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::jwt::MAX_TOKEN_TTL_SECS;
use crate::auth::models::Role;
use crate::auth::password::{PasswordPolicy, DEFAULT_COST, MAX_COST, MIN_COST};
use crate::auth::throttle::ThrottlePolicy;
use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Accounts loaded into the in-memory user store
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

impl Config {
    /// Reject configurations the server cannot run safely with
    pub fn validate(&self) -> Result<()> {
        let auth = &self.auth;
        if auth.access_secret.is_empty() || auth.refresh_secret.is_empty() {
            return Err(Error::Config(
                "auth.access_secret and auth.refresh_secret must be set".to_string(),
            ));
        }
        if auth.access_secret == auth.refresh_secret {
            return Err(Error::Config(
                "auth.access_secret and auth.refresh_secret must differ".to_string(),
            ));
        }
        if auth.access_ttl_secs == 0 || auth.refresh_ttl_secs == 0 {
            return Err(Error::Config("Token lifetimes must be positive".to_string()));
        }
        if auth.access_ttl_secs.max(auth.refresh_ttl_secs) > MAX_TOKEN_TTL_SECS {
            return Err(Error::Config(format!(
                "Token lifetimes must not exceed {} seconds",
                MAX_TOKEN_TTL_SECS
            )));
        }
        if auth.access_ttl_secs >= auth.refresh_ttl_secs {
            return Err(Error::Config(
                "auth.access_ttl_secs must be shorter than auth.refresh_ttl_secs".to_string(),
            ));
        }
        if !(MIN_COST..=MAX_COST).contains(&auth.bcrypt_cost) {
            return Err(Error::Config(format!(
                "auth.bcrypt_cost must be between {} and {}",
                MIN_COST, MAX_COST
            )));
        }
        if self.throttle.max_attempts == 0 || self.throttle.window_secs == 0 {
            return Err(Error::Config(
                "throttle.max_attempts and throttle.window_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Take the client address from `X-Forwarded-For`. Only enable behind a
    /// reverse proxy that overwrites the header.
    #[serde(default)]
    pub trust_proxy: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            trust_proxy: false,
        }
    }
}

/// Token and password settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign access tokens
    #[serde(default)]
    pub access_secret: String,

    /// Secret used to sign refresh tokens, must differ from `access_secret`
    #[serde(default)]
    pub refresh_secret: String,

    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: u64,

    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: u64,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

fn default_access_ttl() -> u64 {
    15 * 60
}

fn default_refresh_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_bcrypt_cost() -> u32 {
    DEFAULT_COST
}

fn default_min_password_length() -> usize {
    PasswordPolicy::default().min_length
}

impl AuthConfig {
    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy {
            min_length: self.min_password_length,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: String::new(),
            refresh_secret: String::new(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            bcrypt_cost: default_bcrypt_cost(),
            min_password_length: default_min_password_length(),
        }
    }
}

/// Login throttle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How often stale throttle entries and expired revocations are purged
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    15 * 60
}

fn default_sweep_interval() -> u64 {
    60
}

impl ThrottleConfig {
    pub fn policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            max_attempts: self.max_attempts,
            window: Duration::from_secs(self.window_secs),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// A user account defined in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSeed {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    /// bcrypt hash, see `schoolgate hash-password`
    pub password_hash: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
