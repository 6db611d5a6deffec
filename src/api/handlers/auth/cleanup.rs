//! Periodic removal of expired sign-in state.
//!
//! Expired one-time codes and sessions are already ignored by every lookup;
//! this worker only keeps the tables from growing. Rate limit attempts are
//! kept for a day, well past the counting window.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, error, info};

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);
const ATTEMPT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Rows deleted by one cleanup pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeCounts {
    pub one_time_codes: u64,
    pub sessions: u64,
    pub attempts: u64,
}

impl PurgeCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.one_time_codes + self.sessions + self.attempts
    }
}

/// Delete expired codes and sessions and stale rate limit attempts.
///
/// # Errors
/// Returns an error if any delete fails.
pub async fn purge_expired(pool: &PgPool) -> Result<PurgeCounts> {
    let one_time_codes = delete(
        pool,
        "DELETE FROM one_time_codes WHERE expires_at <= NOW()",
        None,
    )
    .await
    .context("failed to purge one-time codes")?;

    let sessions = delete(
        pool,
        "DELETE FROM user_sessions WHERE expires_at <= NOW()",
        None,
    )
    .await
    .context("failed to purge sessions")?;

    let attempts = delete(
        pool,
        "DELETE FROM auth_attempts WHERE created_at <= NOW() - $1::interval",
        Some(format!("{} seconds", ATTEMPT_RETENTION.as_secs())),
    )
    .await
    .context("failed to purge auth attempts")?;

    Ok(PurgeCounts {
        one_time_codes,
        sessions,
        attempts,
    })
}

async fn delete(pool: &PgPool, query: &'static str, interval: Option<String>) -> Result<u64> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let mut statement = sqlx::query(query);
    if let Some(interval) = interval {
        statement = statement.bind(interval);
    }
    let result = statement.execute(pool).instrument(span).await?;
    Ok(result.rows_affected())
}

/// Run [`purge_expired`] every `period` until the handle is aborted.
pub fn spawn_cleanup_worker(pool: PgPool, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = period.as_secs(), "auth cleanup worker started");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match purge_expired(&pool).await {
                Ok(counts) if counts.total() == 0 => {}
                Ok(counts) => debug!(
                    one_time_codes = counts.one_time_codes,
                    sessions = counts.sessions,
                    attempts = counts.attempts,
                    "expired auth rows purged"
                ),
                Err(err) => error!("auth cleanup failed: {err:#}"),
            }
        }
    })
}
