//! schoolgate - authentication for a school-management platform
//!
//! Password hashing, access/refresh token issuing, the bearer-token and role
//! middleware that guards protected routes, and a login throttle. The same
//! pieces back the `schoolgate` HTTP server.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;

pub use config::Config;
pub use error::Error;
