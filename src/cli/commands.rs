//! CLI command implementations

use anyhow::{bail, Context, Result};
use dialoguer::Password;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use super::output::{info, print_user_table, success, warn};
use super::OutputFormat;
use crate::auth::models::UserInfo;
use crate::auth::password::{MAX_COST, MIN_COST};
use crate::auth::{InMemoryUserStore, PasswordPolicy, UserStore};
use crate::config::{default_config_content, load_config, CONFIG_FILENAME};

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Initialize a new configuration file
pub async fn init(force: bool) -> Result<()> {
    let path = Path::new(CONFIG_FILENAME);
    if path.exists() && !force {
        warn(&format!(
            "{} already exists. Use --force to overwrite it.",
            CONFIG_FILENAME
        ));
        return Ok(());
    }

    let content = default_config_content(&generate_secret(), &generate_secret());
    fs::write(path, content).with_context(|| format!("Failed to write {}", CONFIG_FILENAME))?;

    success(&format!("Created {}", CONFIG_FILENAME));
    info("Add accounts under [[users]] and hash their passwords with 'schoolgate hash-password'");
    Ok(())
}

/// Start the API server
pub async fn serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = load_config(config_path)?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info(&format!("Starting server at http://{}:{}", host, port));

    crate::api::run_server(config, &host, port).await?;
    Ok(())
}

/// Hash a password for the config file
pub async fn hash_password(password: Option<String>, cost: u32) -> Result<()> {
    if !(MIN_COST..=MAX_COST).contains(&cost) {
        bail!("Cost must be between {} and {}", MIN_COST, MAX_COST);
    }

    let password = match password {
        Some(password) => password,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()?,
    };

    if let Err(e) = PasswordPolicy::default().validate(&password) {
        warn(&format!("Weak password: {}", e));
    }

    let hash =
        tokio::task::spawn_blocking(move || crate::auth::hash_password(&password, cost)).await??;
    println!("{}", hash);
    Ok(())
}

/// List configured users
pub async fn users(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let store = InMemoryUserStore::from_seeds(&config.users)?;
    let users: Vec<UserInfo> = store.list().await?.into_iter().map(UserInfo::from).collect();

    match format {
        OutputFormat::Table => print_user_table(&users),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&users)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&users)?),
    }
    Ok(())
}
