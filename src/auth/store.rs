//! User lookup

use crate::auth::models::{normalize_email, User};
use crate::config::UserSeed;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Source of user accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn update_password_hash(&self, id: i64, password_hash: String) -> Result<()>;

    /// All users ordered by id
    async fn list(&self) -> Result<Vec<User>>;
}

/// User store held in memory, seeded from configuration
pub struct InMemoryUserStore {
    users: RwLock<HashMap<i64, User>>,
}

impl InMemoryUserStore {
    pub fn new(users: Vec<User>) -> Result<Self> {
        let mut emails = HashSet::new();
        let mut by_id = HashMap::with_capacity(users.len());

        for user in users {
            if !emails.insert(user.email.clone()) {
                return Err(Error::Config(format!("Duplicate user email '{}'", user.email)));
            }
            if by_id.contains_key(&user.id) {
                return Err(Error::Config(format!("Duplicate user id {}", user.id)));
            }
            by_id.insert(user.id, user);
        }

        Ok(Self {
            users: RwLock::new(by_id),
        })
    }

    pub fn from_seeds(seeds: &[UserSeed]) -> Result<Self> {
        let users = seeds
            .iter()
            .map(|seed| {
                let mut user = User::new(
                    seed.id,
                    &seed.email,
                    &seed.name,
                    seed.password_hash.clone(),
                    seed.role,
                );
                user.active = seed.active;
                user
            })
            .collect();
        Self::new(users)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn update_password_hash(&self, id: i64, password_hash: String) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(Error::UserNotFound)?;
        user.password_hash = password_hash;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }
}
