//! Database-backed rate limiting for the sign-in endpoints.
//!
//! Flow Overview:
//! 1) Every code request, code check and password sign-in registers a row in
//!    `auth_attempts` with the normalized email and the client IP.
//! 2) A rolling window caps attempts per email and per IP for each action.
//! 3) Counting failures deny the request.
//!
//! Scaling: limits live in `PostgreSQL`, so every instance sees the same counts.

use anyhow::Result;
use sqlx::{PgPool, Row};
use std::{net::IpAddr, time::Duration};
use tracing::{Instrument, error, warn};

const ATTEMPT_WINDOW: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitAction {
    RequestCode,
    VerifyCode,
    Login,
}

impl RateLimitAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestCode => "request_code",
            Self::VerifyCode => "verify_code",
            Self::Login => "login",
        }
    }

    /// Attempts allowed per email inside the window.
    const fn email_limit(self) -> i64 {
        match self {
            Self::RequestCode => 5,
            Self::VerifyCode | Self::Login => 10,
        }
    }

    /// Attempts allowed per client IP inside the window.
    const fn ip_limit(self) -> i64 {
        match self {
            Self::RequestCode => 20,
            Self::VerifyCode | Self::Login => 50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

#[derive(Clone, Debug)]
pub struct AuthRateLimiter {
    pool: PgPool,
}

impl AuthRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Checks the email and IP windows, then records the attempt.
    ///
    /// Limited attempts are not recorded, so a flood does not extend the
    /// window. Database errors deny the request.
    pub async fn register_attempt(
        &self,
        action: RateLimitAction,
        email: &str,
        ip: Option<&str>,
    ) -> RateLimitDecision {
        let email_attempts = match self.count_email_attempts(action, email).await {
            Ok(count) => count,
            Err(err) => {
                error!("Failed to count {} attempts by email: {err}", action.as_str());
                return RateLimitDecision::Limited;
            }
        };
        if email_attempts >= action.email_limit() {
            warn!(email = %email, action = action.as_str(), "auth attempts limited by email");
            return RateLimitDecision::Limited;
        }

        let ip = ip
            .and_then(|ip| ip.parse::<IpAddr>().ok())
            .map(|ip| ip.to_string());
        if let Some(ip) = ip.as_deref() {
            let ip_attempts = match self.count_ip_attempts(action, ip).await {
                Ok(count) => count,
                Err(err) => {
                    error!("Failed to count {} attempts by IP: {err}", action.as_str());
                    return RateLimitDecision::Limited;
                }
            };
            if ip_attempts >= action.ip_limit() {
                warn!(ip = %ip, action = action.as_str(), "auth attempts limited by IP");
                return RateLimitDecision::Limited;
            }
        }

        let query = "INSERT INTO auth_attempts (action, email, ip_address) VALUES ($1, $2, $3)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        match sqlx::query(query)
            .bind(action.as_str())
            .bind(email)
            .bind(ip)
            .execute(&self.pool)
            .instrument(span)
            .await
        {
            Ok(_) => RateLimitDecision::Allowed,
            Err(err) => {
                error!("Failed to register {} attempt: {err}", action.as_str());
                RateLimitDecision::Limited
            }
        }
    }

    async fn count_email_attempts(&self, action: RateLimitAction, email: &str) -> Result<i64> {
        let query = "SELECT COUNT(*) FROM auth_attempts WHERE action = $1 AND email = $2 AND created_at > NOW() - $3::interval";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(action.as_str())
            .bind(email)
            .bind(format!("{} seconds", ATTEMPT_WINDOW.as_secs()))
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.get(0))
    }

    async fn count_ip_attempts(&self, action: RateLimitAction, ip: &str) -> Result<i64> {
        let query = "SELECT COUNT(*) FROM auth_attempts WHERE action = $1 AND ip_address = $2 AND created_at > NOW() - $3::interval";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(action.as_str())
            .bind(ip)
            .bind(format!("{} seconds", ATTEMPT_WINDOW.as_secs()))
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.get(0))
    }
}
