//! Remote collaborators of the sign-in flow.

use secrecy::SecretString;
use std::future::Future;
use thiserror::Error;

/// Failures reported by the identity service, phrased for end users.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("The code is invalid or has expired")]
    InvalidCode,
    #[error("Incorrect password")]
    WrongPassword,
    #[error("Verify your email with a one-time code first")]
    NotVerified,
    #[error("Too many attempts, try again later")]
    RateLimited,
    #[error("{0}")]
    Rejected(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// One-time code exchange and credential management.
pub trait IdentityService: Send + Sync {
    fn request_one_time_code(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Verify the code; on success the service holds a code-verified session.
    fn verify_one_time_code(
        &self,
        email: &str,
        code: &str,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Set the credential on the current verified session.
    fn set_password(
        &self,
        password: &SecretString,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;
}

/// Profile rows kept by the backend.
pub trait ProfileDirectory: Send + Sync {
    fn profile_exists(&self, email: &str)
    -> impl Future<Output = Result<bool, IdentityError>> + Send;

    fn upsert_profile(
        &self,
        display_name: &str,
    ) -> impl Future<Output = Result<(), IdentityError>> + Send;
}
