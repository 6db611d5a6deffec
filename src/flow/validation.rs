//! Client-local form checks. None of these touch the network.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Enter a valid email address")]
    InvalidEmail,
    #[error("Enter all 6 digits of the code")]
    IncompleteCode,
    #[error("Enter your name")]
    MissingName,
    #[error("Enter your password")]
    MissingPassword,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Accept the terms of service to continue")]
    TermsNotAccepted,
    #[error("Accept the privacy policy to continue")]
    PrivacyNotAccepted,
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Length rule shared by registration, reset and the backend.
///
/// # Errors
/// Returns the first rule the password breaks.
pub fn check_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

fn check_confirmation(
    password: &SecretString,
    confirmation: &SecretString,
) -> Result<(), ValidationError> {
    check_password(password.expose_secret())?;
    if password.expose_secret() != confirmation.expose_secret() {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// New-user form collected in the register step.
#[derive(Debug)]
pub struct Registration {
    pub display_name: String,
    pub password: SecretString,
    pub confirmation: SecretString,
    pub accepted_terms: bool,
    pub accepted_privacy: bool,
}

impl Registration {
    /// # Errors
    /// Returns the first field that fails validation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        check_confirmation(&self.password, &self.confirmation)?;
        if !self.accepted_terms {
            return Err(ValidationError::TermsNotAccepted);
        }
        if !self.accepted_privacy {
            return Err(ValidationError::PrivacyNotAccepted);
        }
        Ok(())
    }
}

/// New credential collected in the reset step.
#[derive(Debug)]
pub struct PasswordReset {
    pub password: SecretString,
    pub confirmation: SecretString,
}

impl PasswordReset {
    /// # Errors
    /// Returns the first rule the new password breaks.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_confirmation(&self.password, &self.confirmation)
    }
}
