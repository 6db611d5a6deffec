//! Database helpers for one-time codes, credentials and sessions.

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::session_kind::SessionKind;
use super::state::AuthConfig;
use super::utils::{
    generate_one_time_code, generate_session_token, hash_one_time_code, hash_session_token,
    is_unique_violation,
};

pub(crate) const ONE_TIME_CODE_TEMPLATE: &str = "one_time_code";

/// User row returned once a code has been consumed.
#[derive(Debug)]
pub(super) struct VerifiedUser {
    pub(super) user_id: Uuid,
    pub(super) email: String,
    pub(super) has_password: bool,
}

/// Minimal data returned for a valid session token.
#[derive(Debug)]
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) is_admin: bool,
    pub(crate) kind: SessionKind,
}

/// A profile exists once a credential has been set for the address.
pub(crate) async fn profile_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM users
        WHERE email = $1
          AND password_hash IS NOT NULL
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup profile")?;
    Ok(row.is_some())
}

/// Store a fresh code for `email` and enqueue the email carrying it.
///
/// Earlier unconsumed codes for the address are retired in the same
/// transaction, so only the most recent code can be verified.
pub(super) async fn issue_one_time_code(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin otp transaction")?;

    let query = r"
        UPDATE one_time_codes
        SET consumed_at = NOW()
        WHERE email = $1
          AND consumed_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to retire previous codes")?;

    let code = generate_one_time_code();
    let query = r"
        INSERT INTO one_time_codes (email, code_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(hash_one_time_code(email, &code))
        .bind(config.otp_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert one-time code")?;

    let payload_json = json!({
        "email": email,
        "code": code,
        "expires_in_minutes": config.otp_ttl_seconds() / 60,
        "sign_in_url": config.frontend_base_url().trim_end_matches('/'),
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(ONE_TIME_CODE_TEMPLATE)
        .bind(payload_text)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    tx.commit().await.context("commit otp transaction")?;
    Ok(())
}

/// Wrong guesses a code survives before it is retired.
pub(super) const MAX_CODE_ATTEMPTS: i32 = 5;

/// Outcome of checking a submitted code against the pending one.
#[derive(Debug)]
pub(super) enum CodeCheck {
    Verified(VerifiedUser),
    /// Wrong code; `retired` is set when this guess used up the last attempt.
    Rejected { retired: bool },
    /// No pending, unexpired code for the address.
    Missing,
}

/// Check `code` against the latest pending code for `email`.
///
/// A match consumes the code and makes sure a user row exists. A mismatch
/// counts against the code, which is retired after [`MAX_CODE_ATTEMPTS`]
/// wrong guesses, so a new code has to be requested.
pub(super) async fn consume_one_time_code(
    pool: &PgPool,
    email: &str,
    code: &str,
) -> Result<CodeCheck> {
    let mut tx = pool.begin().await.context("begin otp verify transaction")?;

    // Lock the row so concurrent guesses are counted one after another.
    let query = r"
        SELECT id, code_hash, attempts
        FROM one_time_codes
        WHERE email = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        ORDER BY created_at DESC
        LIMIT 1
        FOR UPDATE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let pending = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load pending one-time code")?;

    let Some(pending) = pending else {
        let _ = tx.rollback().await;
        return Ok(CodeCheck::Missing);
    };
    let code_id: Uuid = pending.get("id");
    let stored_hash: Vec<u8> = pending.get("code_hash");
    let attempts: i32 = pending.get("attempts");

    if stored_hash != hash_one_time_code(email, code) {
        let retired = attempts + 1 >= MAX_CODE_ATTEMPTS;
        let query = r"
            UPDATE one_time_codes
            SET attempts = attempts + 1,
                consumed_at = CASE WHEN $2 THEN NOW() ELSE consumed_at END
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(code_id)
            .bind(retired)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to count one-time code attempt")?;
        tx.commit().await.context("commit otp attempt")?;
        return Ok(CodeCheck::Rejected { retired });
    }

    let query = "UPDATE one_time_codes SET consumed_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(code_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume one-time code")?;

    // First successful verification creates the user row.
    let query = r"
        INSERT INTO users (email)
        VALUES ($1)
        ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
        RETURNING id, email, password_hash IS NOT NULL AS has_password
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to upsert user")?;

    tx.commit().await.context("commit otp verify transaction")?;

    Ok(CodeCheck::Verified(VerifiedUser {
        user_id: row.get("id"),
        email: row.get("email"),
        has_password: row.get("has_password"),
    }))
}

pub(super) async fn lookup_password_hash(pool: &PgPool, user_id: Uuid) -> Result<Option<String>> {
    let query = "SELECT password_hash FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup password hash")?;
    Ok(row.and_then(|row| row.get::<Option<String>, _>("password_hash")))
}

pub(super) async fn store_password_hash(pool: &PgPool, user_id: Uuid, hash: &str) -> Result<()> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store password hash")?;
    Ok(())
}

pub(crate) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    kind: SessionKind,
    ttl_seconds: i64,
) -> Result<String> {
    // Store only the hash and return the raw value for the cookie/body.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, kind, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(kind.as_str())
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT users.id, users.email, users.role = 'admin' AS is_admin, user_sessions.kind
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity without extending the session TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(Some(SessionRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        is_admin: row.get("is_admin"),
        kind: SessionKind::from_column(row.get("kind")),
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::{
        CodeCheck, MAX_CODE_ATTEMPTS, consume_one_time_code, insert_session, issue_one_time_code,
        lookup_session,
    };
    use crate::api::handlers::auth::session_kind::SessionKind;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::api::handlers::auth::utils::hash_session_token;
    use crate::test_support::{ensure_container_runtime, get_test_pool};
    use anyhow::{Context, Result, bail};
    use sqlx::PgPool;
    use uuid::Uuid;

    fn config() -> AuthConfig {
        AuthConfig::new("https://coursegate.dev".to_string())
    }

    /// The code as it was handed to the mailer.
    async fn mailed_code(pool: &PgPool, email: &str) -> Result<String> {
        sqlx::query_scalar(
            "SELECT payload_json->>'code' FROM email_outbox WHERE to_email = $1 ORDER BY created_at DESC, id LIMIT 1",
        )
        .bind(email)
        .fetch_one(pool)
        .await
        .context("no mailed code")
    }

    fn wrong_code(real: &str) -> &'static str {
        if real == "000000" { "111111" } else { "000000" }
    }

    #[tokio::test]
    async fn wrong_guesses_retire_the_code() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = get_test_pool().await?;
        let email = "guess@example.com";
        issue_one_time_code(&pool, email, &config()).await?;
        let real = mailed_code(&pool, email).await?;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let check = consume_one_time_code(&pool, email, wrong_code(&real)).await?;
            let CodeCheck::Rejected { retired } = check else {
                bail!("wrong code was not rejected: {check:?}");
            };
            assert_eq!(retired, attempt == MAX_CODE_ATTEMPTS);
        }

        // The real code no longer works once the attempts are used up.
        let check = consume_one_time_code(&pool, email, &real).await?;
        assert!(matches!(check, CodeCheck::Missing), "{check:?}");

        let attempts: i32 =
            sqlx::query_scalar("SELECT attempts FROM one_time_codes WHERE email = $1")
                .bind(email)
                .fetch_one(&pool)
                .await?;
        assert_eq!(attempts, MAX_CODE_ATTEMPTS);
        Ok(())
    }

    #[tokio::test]
    async fn code_survives_a_few_wrong_guesses() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = get_test_pool().await?;
        let email = "typo@example.com";
        issue_one_time_code(&pool, email, &config()).await?;
        let real = mailed_code(&pool, email).await?;

        for _ in 1..MAX_CODE_ATTEMPTS {
            consume_one_time_code(&pool, email, wrong_code(&real)).await?;
        }
        let check = consume_one_time_code(&pool, email, &real).await?;
        let CodeCheck::Verified(user) = check else {
            bail!("real code was not accepted: {check:?}");
        };
        assert_eq!(user.email, email);
        assert!(!user.has_password);

        // Single use.
        let check = consume_one_time_code(&pool, email, &real).await?;
        assert!(matches!(check, CodeCheck::Missing), "{check:?}");
        Ok(())
    }

    #[tokio::test]
    async fn resent_code_supersedes_earlier_ones() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = get_test_pool().await?;
        let email = "resend@example.com";
        issue_one_time_code(&pool, email, &config()).await?;
        let first = mailed_code(&pool, email).await?;
        issue_one_time_code(&pool, email, &config()).await?;
        let second = mailed_code(&pool, email).await?;

        let pending: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM one_time_codes WHERE email = $1 AND consumed_at IS NULL",
        )
        .bind(email)
        .fetch_one(&pool)
        .await?;
        assert_eq!(pending, 1);

        if first != second {
            let check = consume_one_time_code(&pool, email, &first).await?;
            assert!(matches!(check, CodeCheck::Rejected { .. }), "{check:?}");
        }
        let check = consume_one_time_code(&pool, email, &second).await?;
        assert!(matches!(check, CodeCheck::Verified(_)), "{check:?}");
        Ok(())
    }

    #[tokio::test]
    async fn session_kind_is_stored_with_the_token() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = get_test_pool().await?;
        let user_id: Uuid =
            sqlx::query_scalar("INSERT INTO users (email) VALUES ('kind@example.com') RETURNING id")
                .fetch_one(&pool)
                .await?;

        for kind in [SessionKind::Otp, SessionKind::Full] {
            let token = insert_session(&pool, user_id, kind, 600).await?;
            let record = lookup_session(&pool, &hash_session_token(&token))
                .await?
                .context("session not found")?;
            assert_eq!(record.kind, kind);
            assert_eq!(record.user_id, user_id);
            assert!(!record.is_admin);
        }

        let expired = insert_session(&pool, user_id, SessionKind::Full, -1).await?;
        assert!(
            lookup_session(&pool, &hash_session_token(&expired))
                .await?
                .is_none()
        );
        Ok(())
    }
}
