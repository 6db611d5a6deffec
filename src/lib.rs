//! # Coursegate
//!
//! `coursegate` serves an online course catalog whose lessons unlock one after
//! another, and the email-first sign-in that gates them.
//!
//! ## Lesson access
//!
//! [`access`] decides, for a learner and a lesson, whether the lesson is open.
//! Anonymous visitors get the first lesson of each course as a preview. Free
//! lessons open in sequence; paid lessons additionally need a course purchase
//! or a premium subscription. Opening an unlocked lesson marks it completed,
//! which unlocks the next one.
//!
//! ## Sign-in
//!
//! [`flow`] is the client-side state machine: the user enters an email,
//! proves ownership with a six-digit one-time code, then either registers
//! (new address) or enters a password (known address), with a reset path for
//! forgotten passwords. [`client`] implements its remote calls against the
//! HTTP API in [`api`].
//!
//! ## Sessions
//!
//! Code verification issues a short-lived `otp` session that can only set a
//! password or complete a password sign-in. Either of those exchanges it for
//! a full session. Only SHA-256 hashes of session tokens are stored.

pub mod access;
pub mod api;
pub mod cli;
pub mod client;
pub mod flow;

#[cfg(test)]
pub(crate) mod test_support;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
