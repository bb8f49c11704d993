//! Revoked token tracking

use crate::auth::jwt::Claims;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory denylist of token ids
///
/// An entry only has to outlive the token it blocks, so entries are dropped once
/// their `exp` has passed.
pub struct RevocationList {
    revoked: Arc<RwLock<HashMap<String, i64>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self {
            revoked: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Revoke a token id until `exp` (unix seconds)
    pub async fn revoke(&self, jti: &str, exp: i64) {
        self.revoked.write().await.insert(jti.to_string(), exp);
    }

    /// Revoke the token described by `claims`
    pub async fn revoke_claims(&self, claims: &Claims) {
        debug!("Revoking {} token {} of user {}", claims.typ, claims.jti, claims.user.id);
        self.revoke(&claims.jti, claims.exp).await;
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.read().await.contains_key(jti)
    }

    /// Forget entries whose token has expired on its own
    pub async fn purge_expired(&self) -> usize {
        let now = chrono::Utc::now().timestamp();
        let mut revoked = self.revoked.write().await;
        let before = revoked.len();
        revoked.retain(|_, exp| *exp >= now);
        before - revoked.len()
    }

    pub async fn len(&self) -> usize {
        self.revoked.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.revoked.read().await.is_empty()
    }
}

impl Default for RevocationList {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RevocationList {
    fn clone(&self) -> Self {
        Self {
            revoked: Arc::clone(&self.revoked),
        }
    }
}
