use crate::api;
use crate::cli::commands::server::Options;
use crate::cli::telemetry;
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub otp_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub otp_session_ttl_seconds: i64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

impl From<Options> for Args {
    fn from(options: Options) -> Self {
        Self {
            port: options.port,
            dsn: options.dsn,
            frontend_base_url: options.frontend_base_url,
            otp_ttl_seconds: options.otp_ttl_seconds,
            session_ttl_seconds: options.session_ttl_seconds,
            otp_session_ttl_seconds: options.otp_session_ttl_seconds,
            email_outbox_poll_seconds: options.email_outbox.poll_seconds,
            email_outbox_batch_size: options.email_outbox.batch_size,
            email_outbox_max_attempts: options.email_outbox.max_attempts,
            email_outbox_backoff_base_seconds: options.email_outbox.backoff_base_seconds,
            email_outbox_backoff_max_seconds: options.email_outbox.backoff_max_seconds,
        }
    }
}

impl Args {
    fn auth_config(&self) -> api::handlers::auth::AuthConfig {
        api::handlers::auth::AuthConfig::new(self.frontend_base_url.clone())
            .with_otp_ttl_seconds(self.otp_ttl_seconds)
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_otp_session_ttl_seconds(self.otp_session_ttl_seconds)
    }

    fn email_config(&self) -> api::email::EmailWorkerConfig {
        api::email::EmailWorkerConfig::new()
            .with_poll_interval_seconds(self.email_outbox_poll_seconds)
            .with_batch_size(self.email_outbox_batch_size)
            .with_max_attempts(self.email_outbox_max_attempts)
            .with_backoff_base_seconds(self.email_outbox_backoff_base_seconds)
            .with_backoff_max_seconds(self.email_outbox_backoff_max_seconds)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(port = args.port, frontend = %args.frontend_base_url, "starting server");

    let auth_config = args.auth_config();
    let email_config = args.email_config();
    let result = api::new(args.port, args.dsn, auth_config, email_config).await;

    telemetry::shutdown_tracer();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::server::EmailOutboxOptions;
    use std::time::Duration;

    fn args() -> Args {
        Args::from(Options {
            port: 8080,
            dsn: "postgres://localhost/coursegate".to_string(),
            frontend_base_url: "https://learn.example.com".to_string(),
            otp_ttl_seconds: 300,
            session_ttl_seconds: 3600,
            otp_session_ttl_seconds: 120,
            email_outbox: EmailOutboxOptions {
                poll_seconds: 2,
                batch_size: 20,
                max_attempts: 3,
                backoff_base_seconds: 1,
                backoff_max_seconds: 60,
            },
        })
    }

    #[test]
    fn email_config_from_args() {
        let config = args().email_config();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.batch_size(), 20);
        assert_eq!(config.max_attempts(), 3);
    }

    #[test]
    fn auth_config_from_args() {
        let config = args().auth_config();
        assert_eq!(config.frontend_base_url(), "https://learn.example.com");
    }
}
