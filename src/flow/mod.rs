//! Multi-step sign-in flow.
//!
//! ```text
//! email -> code -> register -> authenticated
//!               -> password -> authenticated
//!                  password -> reset -> authenticated
//! ```
//!
//! A one-time code proves ownership of the address before any credential is
//! set or checked; `register`, `password` and `reset` are unreachable without
//! a successful code verification in the same [`LoginFlow`].
//!
//! The flow never talks to the network itself. Every remote call goes through
//! [`IdentityService`] and [`ProfileDirectory`], so the state machine can be
//! driven by the HTTP client or by an in-memory fake.

mod countdown;
mod identity;
mod otp;
mod state;
pub mod validation;

pub use countdown::{DEFAULT_RESEND_COOLDOWN, ResendCountdown};
pub use identity::{IdentityError, IdentityService, ProfileDirectory};
pub use otp::{CODE_LENGTH, OtpInput, is_valid_code};
pub use state::{FlowError, LoginFlow, Step};
pub use validation::{PasswordReset, Registration, ValidationError};
