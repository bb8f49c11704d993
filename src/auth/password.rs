//! Password hashing and strength rules

use crate::error::{Error, Result};

/// Work factor used for new hashes unless configured otherwise
pub const DEFAULT_COST: u32 = 12;

/// Work factors bcrypt accepts
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

/// Hash a password with bcrypt
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Check a password against a stored bcrypt hash
///
/// Returns `Ok(false)` for a wrong password. A hash that bcrypt cannot parse
/// is reported as an error since it means the stored record is corrupt.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Rules a new password has to satisfy
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub min_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self { min_length: 8 }
    }
}

impl PasswordPolicy {
    pub fn validate(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_length {
            return Err(Error::Validation(format!(
                "Password must be at least {} characters long",
                self.min_length
            )));
        }

        let has_letter = password.chars().any(char::is_alphabetic);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        if !has_letter || !has_digit {
            return Err(Error::Validation(
                "Password must contain at least one letter and one number".to_string(),
            ));
        }

        Ok(())
    }
}
