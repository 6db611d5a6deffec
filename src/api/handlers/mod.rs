//! API handlers for the course platform.
//!
//! `auth` is the identity service driven by the sign-in flow; `courses`
//! serves the catalog through the access engine.

pub mod auth;
pub mod courses;
pub mod health;
pub mod me;
pub mod profiles;
