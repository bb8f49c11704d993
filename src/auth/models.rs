//! Authentication models

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// School roles for authorization
///
/// Roles are parsed case-insensitively wherever they cross a boundary
/// (config files, token claims), so `"Teacher"` and `"teacher"` are the same role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator - full access
    Admin,
    Teacher,
    Student,
    Parent,
    Registrar,
    Accounting,
    Guidance,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Admin,
        Role::Teacher,
        Role::Student,
        Role::Parent,
        Role::Registrar,
        Role::Accounting,
        Role::Guidance,
    ];

    /// Numeric role id, derived from the role itself
    pub fn id(self) -> i32 {
        match self {
            Role::Admin => 1,
            Role::Teacher => 2,
            Role::Student => 3,
            Role::Parent => 4,
            Role::Registrar => 5,
            Role::Accounting => 6,
            Role::Guidance => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::Registrar => "registrar",
            Role::Accounting => "accounting",
            Role::Guidance => "guidance",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Claims identifying a user, embedded in both access and refresh tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub role_id: i32,
}

impl UserPayload {
    pub fn new(id: i64, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            role,
            role_id: role.id(),
        }
    }
}

/// Stored user account
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    /// Normalized (trimmed, lowercase) email
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    /// Whether the account is active
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl User {
    pub fn new(id: i64, email: &str, name: &str, password_hash: String, role: Role) -> Self {
        Self {
            id,
            email: normalize_email(email),
            name: name.to_string(),
            password_hash,
            role,
            active: true,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn payload(&self) -> UserPayload {
        UserPayload::new(self.id, self.email.clone(), self.role)
    }
}

/// Canonical form used for email comparisons
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Login credentials
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response with both tokens
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserInfo,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// User information in responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub role_id: i32,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            role_id: user.role.id(),
            active: user.active,
            created_at: user.created_at,
        }
    }
}
