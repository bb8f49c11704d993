//! Configuration loading and environment variable interpolation

use crate::error::{Error, Result};
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::Config;

pub const CONFIG_FILENAME: &str = "schoolgate.toml";

/// Load configuration from an explicit path, or search for schoolgate.toml
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config_from_path(path),
        None => load_config_from_path(&find_config_file()?),
    }
}

/// Load and validate configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|_| Error::ConfigNotFound)?;
    let content = interpolate_env_vars(&content);
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Find the configuration file, searching upward from current directory
fn find_config_file() -> Result<PathBuf> {
    let mut current = env::current_dir().map_err(|e| Error::Config(e.to_string()))?;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(Error::ConfigNotFound);
        }
    }
}

/// Interpolate environment variables in the format ${VAR_NAME} or ${VAR_NAME:-default}
fn interpolate_env_vars(content: &str) -> String {
    // This regex is a compile-time constant, panicking is acceptable here
    // as it indicates a programming error in the codebase, not a runtime issue
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("Invalid regex pattern - this is a bug in the codebase");

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Generate a starter configuration with the given signing secrets
pub fn default_config_content(access_secret: &str, refresh_secret: &str) -> String {
    format!(
        r#"# schoolgate configuration

[server]
host = "0.0.0.0"
port = 5000
# Key the login throttle on X-Forwarded-For. Only enable behind a proxy that
# overwrites the header.
trust_proxy = false

[auth]
# Independent secrets for the two token families. Override per environment with
# SCHOOLGATE_ACCESS_SECRET / SCHOOLGATE_REFRESH_SECRET.
access_secret = "${{SCHOOLGATE_ACCESS_SECRET:-{access_secret}}}"
refresh_secret = "${{SCHOOLGATE_REFRESH_SECRET:-{refresh_secret}}}"
access_ttl_secs = 900        # 15 minutes
refresh_ttl_secs = 604800    # 7 days
bcrypt_cost = 12
min_password_length = 8

[throttle]
max_attempts = 5
window_secs = 900
sweep_interval_secs = 60

# Accounts. Generate hashes with `schoolgate hash-password`.
# [[users]]
# id = 1
# email = "admin@school.edu"
# name = "School Administrator"
# role = "admin"
# password_hash = "$2b$12$..."
# active = true
"#
    )
}
