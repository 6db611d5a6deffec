//! One-time-code email delivery through the `email_outbox` table.
//!
//! `POST /v1/auth/otp` writes the code row and its outbox row in one
//! transaction. This worker picks up `pending` rows whose `next_attempt_at`
//! has passed, locks them with `FOR UPDATE SKIP LOCKED` so several server
//! instances can poll the same table, and hands each one to an `EmailSender`.
//!
//! Failed sends are rescheduled with exponential backoff plus jitter until
//! `max_attempts` is reached, after which the row is parked as `failed`.
//! Delivery itself is pluggable; the default `LogEmailSender` only logs.
use anyhow::{Context, Result, anyhow};
use rand::Rng;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::handlers::auth::storage::ONE_TIME_CODE_TEMPLATE;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Payload written by the code request handler.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct OneTimeCodeEmail {
    pub email: String,
    pub code: String,
    pub expires_in_minutes: u64,
    pub sign_in_url: String,
}

impl EmailMessage {
    /// Subject and plain-text body for the message's template.
    ///
    /// # Errors
    /// Returns an error for unknown templates or a payload that does not match.
    pub fn render(&self) -> Result<(String, String)> {
        if self.template != ONE_TIME_CODE_TEMPLATE {
            return Err(anyhow!("unknown email template: {}", self.template));
        }
        let payload: OneTimeCodeEmail = serde_json::from_str(&self.payload_json)
            .context("invalid one_time_code payload")?;
        let subject = format!("Your sign-in code is {}", payload.code);
        let body = format!(
            "Enter {} to continue signing in as {}.\n\
             The code expires in {} minutes.\n\
             {}\n",
            payload.code, payload.email, payload.expires_in_minutes, payload.sign_in_url
        );
        Ok((subject, body))
    }
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Sender for local development: renders the message and logs it.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        let (subject, body) = message.render()?;
        info!(
            to_email = %message.to_email,
            template = %message.template,
            subject = %subject,
            body = %body,
            "email outbox delivery logged"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// 5s poll, 10 rows per batch, 5 attempts, 5s to 5m backoff.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Replace zero values with the smallest usable ones and keep
    /// `backoff_max >= backoff_base`.
    #[must_use]
    pub fn normalize(self) -> Self {
        let one_second = Duration::from_secs(1);
        let backoff_base = self.backoff_base.max(one_second);
        Self {
            poll_interval: self.poll_interval.max(one_second),
            batch_size: self.batch_size.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What happens to a row after a send attempt.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Sent,
    Retry(Duration),
    Failed,
}

impl EmailWorkerConfig {
    fn disposition(&self, attempts: u32, delivered: bool) -> Disposition {
        if delivered {
            Disposition::Sent
        } else if attempts >= self.max_attempts {
            Disposition::Failed
        } else {
            Disposition::Retry(jitter_delay(backoff_delay(
                attempts,
                self.backoff_base,
                self.backoff_max,
            )))
        }
    }
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        info!(
            poll_interval_secs = config.poll_interval().as_secs(),
            batch_size = config.batch_size(),
            "email outbox worker started"
        );

        loop {
            match process_outbox_batch(&pool, sender.as_ref(), &config).await {
                Ok(0) => {}
                Ok(count) => debug!(count, "email outbox batch processed"),
                Err(err) => error!("email outbox batch failed: {err:#}"),
            }

            sleep(config.poll_interval()).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let previous: i32 = row.get("attempts");
        let attempts = u32::try_from(previous).unwrap_or(0).saturating_add(1);
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let result = sender.send(&message);
        let last_error = result.as_ref().err().map(|err| format!("{err:#}"));
        let disposition = config.disposition(attempts, result.is_ok());
        if let Some(last_error) = &last_error {
            warn!(%id, attempts, last_error, "email delivery failed");
        }
        record_disposition(&mut tx, id, attempts, disposition, last_error).await?;
    }

    // Commit even on an empty batch to release the transaction.
    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(count)
}

async fn record_disposition(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    attempts: u32,
    disposition: Disposition,
    last_error: Option<String>,
) -> Result<()> {
    let attempts = i32::try_from(attempts).unwrap_or(i32::MAX);
    let (status, delay) = match disposition {
        Disposition::Sent => ("sent", Duration::ZERO),
        Disposition::Retry(delay) => ("pending", delay),
        Disposition::Failed => ("failed", Duration::ZERO),
    };
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);

    let query = r"
        UPDATE email_outbox
        SET status = $2,
            attempts = $3,
            last_error = $4,
            sent_at = CASE WHEN $2 = 'sent' THEN NOW() ELSE sent_at END,
            next_attempt_at = NOW() + ($5 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(status)
        .bind(attempts)
        .bind(last_error)
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .with_context(|| format!("failed to mark email outbox row {status}"))?;

    Ok(())
}

/// Exponential delay for the given attempt (1-based), capped at `max`.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << shift).unwrap_or(max).min(max)
}

/// Uniform delay in `[delay / 2, delay]`.
fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=delay_ms - half))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code_message() -> EmailMessage {
        EmailMessage {
            to_email: "ada@example.com".to_string(),
            template: ONE_TIME_CODE_TEMPLATE.to_string(),
            payload_json: json!({
                "email": "ada@example.com",
                "code": "042137",
                "expires_in_minutes": 10,
                "sign_in_url": "http://localhost:8080/login"
            })
            .to_string(),
        }
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        assert_eq!(backoff_delay(1, base, max), Duration::from_secs(5));
        assert_eq!(backoff_delay(2, base, max), Duration::from_secs(10));
        assert_eq!(backoff_delay(4, base, max), Duration::from_secs(40));
        assert_eq!(backoff_delay(10, base, max), max);
        assert_eq!(backoff_delay(u32::MAX, base, max), max);
    }

    #[test]
    fn jitter_stays_within_upper_half() {
        let delay = Duration::from_secs(10);
        for _ in 0..100 {
            let jittered = jitter_delay(delay);
            assert!(jittered >= Duration::from_secs(5));
            assert!(jittered <= delay);
        }
        assert_eq!(jitter_delay(Duration::from_millis(1)), Duration::from_millis(1));
    }

    #[test]
    fn normalize_replaces_zero_values() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .with_backoff_base_seconds(0)
            .with_backoff_max_seconds(0)
            .normalize();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert_eq!(config.backoff_max, Duration::from_secs(1));
    }

    #[test]
    fn disposition_retries_then_fails() {
        let config = EmailWorkerConfig::new().with_max_attempts(3);
        assert_eq!(config.disposition(1, true), Disposition::Sent);
        assert!(matches!(config.disposition(1, false), Disposition::Retry(_)));
        assert!(matches!(config.disposition(2, false), Disposition::Retry(_)));
        assert_eq!(config.disposition(3, false), Disposition::Failed);
    }

    #[test]
    fn render_one_time_code() -> Result<()> {
        let (subject, body) = code_message().render()?;
        assert_eq!(subject, "Your sign-in code is 042137");
        assert!(body.contains("expires in 10 minutes"));
        assert!(body.contains("http://localhost:8080/login"));
        Ok(())
    }

    #[test]
    fn render_rejects_unknown_template() {
        let mut message = code_message();
        message.template = "welcome".to_string();
        assert!(message.render().is_err());
        assert!(LogEmailSender.send(&message).is_err());
    }

    #[test]
    fn log_sender_accepts_code_messages() {
        assert!(LogEmailSender.send(&code_message()).is_ok());
    }
}
