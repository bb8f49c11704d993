//! Authentication, authorization and login throttling

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod revocation;
pub mod store;
pub mod throttle;

pub use jwt::{Claims, TokenIssuer, TokenKind};
pub use middleware::{
    authorize, bearer_token, require_auth, require_role, AuthGate, AuthUser, ClientKey,
    TrustProxy,
};
pub use models::{Role, User, UserPayload};
pub use password::{hash_password, verify_password, PasswordPolicy};
pub use revocation::RevocationList;
pub use store::{InMemoryUserStore, UserStore};
pub use throttle::{
    AttemptStore, InMemoryAttemptStore, LoginThrottle, RateLimitEntry, ThrottleDecision,
    ThrottlePolicy, ThrottleState,
};
