//! Auth handlers and supporting modules.
//!
//! Sign-in always starts with a one-time code sent to the address. A verified
//! code yields an `otp` session that can only set a password (new users,
//! resets) or check one (returning users); both end with a full session.
//!
//! Session tokens are 32 random bytes, base64url encoded, returned in the
//! body and an `HttpOnly` cookie. The database stores only their SHA-256 and
//! the session kind.
//!
//! Code requests, code checks and password attempts are counted per email
//! and per client IP in `auth_attempts`; a code is retired after five wrong
//! guesses.

pub mod cleanup;
pub(crate) mod credentials;
pub(crate) mod otp;
mod password;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod session;
pub(crate) mod session_kind;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
mod utils;

pub use rate_limit::{AuthRateLimiter, RateLimitAction, RateLimitDecision};
pub use state::{AuthConfig, AuthState};
pub(crate) use utils::is_unique_violation;
