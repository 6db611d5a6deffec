//! Session kind markers.
//!
//! - `full` sessions have normal access.
//! - `otp` sessions prove a one-time code was verified; they may only set a
//!   password or complete a password sign-in for the same user.
//!
//! The kind is stored in `user_sessions.kind` next to the token hash, so both
//! kinds share one token format.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Full session with normal access.
    Full,
    /// Code-verified session limited to the credential step.
    Otp,
}

impl SessionKind {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Otp => "otp",
        }
    }

    /// Unknown values are treated as the restricted kind.
    pub(crate) fn from_column(value: &str) -> Self {
        match value {
            "full" => Self::Full,
            _ => Self::Otp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionKind;

    #[test]
    fn session_kind_column_values() {
        for kind in [SessionKind::Full, SessionKind::Otp] {
            assert_eq!(SessionKind::from_column(kind.as_str()), kind);
        }
        assert_eq!(SessionKind::from_column("admin"), SessionKind::Otp);
    }

    #[test]
    fn session_kind_serializes_snake_case() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&SessionKind::Otp)?, "\"otp\"");
        assert_eq!(serde_json::to_string(&SessionKind::Full)?, "\"full\"");
        Ok(())
    }
}
