//! Interactive sign-in over stdin.
//!
//! The code prompt accepts `back` and `resend`. Passwords are read without
//! echo when stdin is a terminal, and any text is taken as the password: an
//! empty line instead opens a menu to go back or reset a forgotten password.
//! After sign-in the unlock map of `--course-id` is printed when one was
//! given.

use crate::api::handlers::courses::types::LessonSummary;
use crate::cli::commands::login::Options;
use crate::client::ApiClient;
use crate::flow::{
    FlowError, IdentityService, LoginFlow, PasswordReset, ProfileDirectory, Registration, Step,
};
use anyhow::{Result, bail};
use dialoguer::Password;
use secrecy::SecretString;
use std::fmt::Write as _;
use std::io::IsTerminal;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub api_url: String,
    pub email: Option<String>,
    pub course_id: Option<i64>,
    pub resend_cooldown_seconds: u64,
}

impl From<Options> for Args {
    fn from(options: Options) -> Self {
        Self {
            api_url: options.api_url,
            email: options.email,
            course_id: options.course_id,
            resend_cooldown_seconds: options.resend_cooldown_seconds,
        }
    }
}

/// Execute the login action.
/// # Errors
/// Returns an error if the API URL is invalid or stdin closes before sign-in completes.
pub async fn execute(args: Args) -> Result<()> {
    let client = ApiClient::new(&args.api_url)?;
    let mut flow =
        LoginFlow::new().with_resend_cooldown(Duration::from_secs(args.resend_cooldown_seconds));
    let mut input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    let console = Console {
        input: &mut input,
        output: &mut output,
        hide_secrets: std::io::stdin().is_terminal(),
    };

    drive_flow(&client, &mut flow, args.email.as_deref(), console).await?;

    if let Some(course_id) = args.course_id {
        let lessons = client.course_lessons(course_id).await;
        output
            .write_all(render_lessons(course_id, &lessons).as_bytes())
            .await?;
        output.flush().await?;
    }

    Ok(())
}

/// Drive the flow from line input until it reaches `Authenticated`.
///
/// Passwords are read from `input` like any other line.
///
/// # Errors
/// Returns an error when input ends first or output cannot be written.
pub async fn run_flow<S, R, W>(
    service: &S,
    flow: &mut LoginFlow,
    preset_email: Option<&str>,
    input: &mut R,
    output: &mut W,
) -> Result<()>
where
    S: IdentityService + ProfileDirectory,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let console = Console {
        input,
        output,
        hide_secrets: false,
    };
    drive_flow(service, flow, preset_email, console).await
}

async fn drive_flow<S, R, W>(
    service: &S,
    flow: &mut LoginFlow,
    mut preset_email: Option<&str>,
    mut console: Console<'_, R, W>,
) -> Result<()>
where
    S: IdentityService + ProfileDirectory,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let result = match flow.step() {
            Step::Authenticated => break,
            Step::Email => {
                let email = match preset_email.take() {
                    Some(email) => email.to_string(),
                    None => console.prompt("Email: ").await?,
                };
                flow.submit_email(service, &email, Instant::now()).await
            }
            Step::Code => {
                let remaining = flow.resend_remaining_secs(Instant::now());
                let label = if remaining > 0 {
                    format!("Code (back, resend in {remaining}s): ")
                } else {
                    "Code (back, resend): ".to_string()
                };
                let line = console.prompt(&label).await?;
                match line.as_str() {
                    "back" => flow.back(),
                    "resend" => flow.resend_code(service, Instant::now()).await,
                    code => {
                        flow.otp_mut().clear();
                        flow.otp_mut().input(0, code);
                        flow.submit_code(service).await
                    }
                }
            }
            Step::Register => match registration(&mut console).await? {
                Some(form) => flow.submit_registration(service, &form).await,
                None => flow.back(),
            },
            Step::Password => {
                let password = console.secret("Password (Enter for options): ").await?;
                if password.is_empty() {
                    let choice = console
                        .prompt("[b]ack, [f]orgot password, or Enter to retry: ")
                        .await?;
                    match choice.to_lowercase().as_str() {
                        "b" | "back" => flow.back(),
                        "f" | "forgot" => flow.forgot_password(),
                        _ => continue,
                    }
                } else {
                    flow.submit_password(service, &SecretString::from(password))
                        .await
                }
            }
            Step::Reset => match reset(&mut console).await? {
                Some(form) => flow.submit_reset(service, &form).await,
                None => flow.back(),
            },
        };

        report(&mut console, flow, result).await?;
    }

    console.say(&format!("Signed in as {}\n", flow.email())).await
}

async fn report<R, W>(
    console: &mut Console<'_, R, W>,
    flow: &LoginFlow,
    result: Result<Step, FlowError>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match result {
        Ok(step) => {
            debug!(%step, "sign-in step");
            if let Some(success) = flow.success() {
                console.say(&format!("{success}\n")).await?;
            }
        }
        Err(err) => {
            let message = flow.error().map_or_else(|| err.to_string(), str::to_string);
            console.say(&format!("error: {message}\n")).await?;
        }
    }
    Ok(())
}

/// `None` when the display name is left empty.
async fn registration<R, W>(console: &mut Console<'_, R, W>) -> Result<Option<Registration>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let display_name = console.prompt("Display name (empty to go back): ").await?;
    if display_name.is_empty() {
        return Ok(None);
    }
    let password = console.secret("Password: ").await?;
    let confirmation = console.secret("Confirm password: ").await?;
    let accepted_terms = console.confirm("Accept the terms of service? [y/N]: ").await?;
    let accepted_privacy = console.confirm("Accept the privacy policy? [y/N]: ").await?;

    Ok(Some(Registration {
        display_name,
        password: SecretString::from(password),
        confirmation: SecretString::from(confirmation),
        accepted_terms,
        accepted_privacy,
    }))
}

/// `None` when the new password is left empty.
async fn reset<R, W>(console: &mut Console<'_, R, W>) -> Result<Option<PasswordReset>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let password = console.secret("New password (empty to go back): ").await?;
    if password.is_empty() {
        return Ok(None);
    }
    let confirmation = console.secret("Confirm new password: ").await?;

    Ok(Some(PasswordReset {
        password: SecretString::from(password),
        confirmation: SecretString::from(confirmation),
    }))
}

struct Console<'a, R, W> {
    input: &'a mut R,
    output: &'a mut W,
    /// Read secrets from the terminal without echo instead of from `input`.
    hide_secrets: bool,
}

impl<R, W> Console<'_, R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    async fn say(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }

    /// One trimmed line; input closing mid-flow is an error.
    async fn prompt(&mut self, label: &str) -> Result<String> {
        self.say(label).await?;
        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            bail!("input closed before sign-in completed");
        }
        Ok(line.trim().to_string())
    }

    /// A password line. Unlike [`Self::prompt`] it is not trimmed, so
    /// surrounding spaces stay part of the secret.
    async fn secret(&mut self, label: &str) -> Result<String> {
        if !self.hide_secrets {
            self.say(label).await?;
            let mut line = String::new();
            if self.input.read_line(&mut line).await? == 0 {
                bail!("input closed before sign-in completed");
            }
            return Ok(line.trim_end_matches(['\r', '\n']).to_string());
        }

        // The theme adds its own ": " after the prompt.
        let label = label.trim_end().trim_end_matches(':').to_string();
        let secret = tokio::task::spawn_blocking(move || {
            Password::new()
                .with_prompt(label)
                .allow_empty_password(true)
                .interact()
        })
        .await??;
        Ok(secret)
    }

    async fn confirm(&mut self, label: &str) -> Result<bool> {
        let answer = self.prompt(label).await?;
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Text rendering of a course's lessons with their lock state.
#[must_use]
pub fn render_lessons(course_id: i64, lessons: &[LessonSummary]) -> String {
    let mut out = format!("Course {course_id}\n");
    if lessons.is_empty() {
        out.push_str("  no lessons available\n");
        return out;
    }
    for (position, lesson) in lessons.iter().enumerate() {
        let mark = if lesson.completed {
            "done"
        } else if lesson.unlocked {
            "open"
        } else {
            "lock"
        };
        let free = if lesson.is_free { " (free)" } else { "" };
        let _ = writeln!(out, "  [{mark}] {}. {}{free}", position + 1, lesson.title);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::IdentityError;
    use secrecy::ExposeSecret;
    use std::sync::Mutex;

    const GOOD_CODE: &str = "424242";

    #[derive(Default)]
    struct FakeIdentity {
        exists: bool,
        password: Mutex<Option<String>>,
        display_name: Mutex<Option<String>>,
    }

    impl FakeIdentity {
        fn returning(password: &str) -> Self {
            Self {
                exists: true,
                password: Mutex::new(Some(password.to_string())),
                ..Self::default()
            }
        }
    }

    impl IdentityService for FakeIdentity {
        async fn request_one_time_code(&self, _email: &str) -> Result<(), IdentityError> {
            Ok(())
        }

        async fn verify_one_time_code(&self, _email: &str, code: &str) -> Result<(), IdentityError> {
            if code == GOOD_CODE {
                Ok(())
            } else {
                Err(IdentityError::InvalidCode)
            }
        }

        async fn sign_in_with_password(
            &self,
            _email: &str,
            password: &SecretString,
        ) -> Result<(), IdentityError> {
            let stored = self.password.lock().map_err(|_| IdentityError::WrongPassword)?;
            if stored.as_deref() == Some(password.expose_secret()) {
                Ok(())
            } else {
                Err(IdentityError::WrongPassword)
            }
        }

        async fn set_password(&self, password: &SecretString) -> Result<(), IdentityError> {
            if let Ok(mut stored) = self.password.lock() {
                *stored = Some(password.expose_secret().to_string());
            }
            Ok(())
        }
    }

    impl ProfileDirectory for FakeIdentity {
        async fn profile_exists(&self, _email: &str) -> Result<bool, IdentityError> {
            Ok(self.exists)
        }

        async fn upsert_profile(&self, display_name: &str) -> Result<(), IdentityError> {
            if let Ok(mut stored) = self.display_name.lock() {
                *stored = Some(display_name.to_string());
            }
            Ok(())
        }
    }

    async fn drive(
        service: &FakeIdentity,
        preset_email: Option<&str>,
        script: &str,
    ) -> (Result<()>, LoginFlow, String) {
        let mut flow = LoginFlow::new();
        let mut input = BufReader::new(script.as_bytes());
        let mut output = Vec::new();
        let result = run_flow(service, &mut flow, preset_email, &mut input, &mut output).await;
        (result, flow, String::from_utf8_lossy(&output).into_owned())
    }

    #[tokio::test]
    async fn new_user_registers() -> Result<()> {
        let service = FakeIdentity::default();
        let script = "ada@example.com\n424242\nAda\nsecret1\nsecret1\ny\nyes\n";
        let (result, flow, output) = drive(&service, None, script).await;
        result?;
        assert_eq!(flow.step(), Step::Authenticated);
        assert!(output.contains("Signed in as ada@example.com"));
        let name = service.display_name.lock().map(|name| name.clone()).ok().flatten();
        assert_eq!(name.as_deref(), Some("Ada"));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_is_reported_and_retried() -> Result<()> {
        let service = FakeIdentity::returning("hunter22");
        let script = "111111\n424242\nhunter22\n";
        let (result, flow, output) = drive(&service, Some("ada@example.com"), script).await;
        result?;
        assert_eq!(flow.step(), Step::Authenticated);
        assert!(output.contains("error: The code is invalid or has expired"));
        Ok(())
    }

    #[tokio::test]
    async fn resend_during_cooldown_is_refused() -> Result<()> {
        let service = FakeIdentity::returning("hunter22");
        let script = "resend\n424242\nhunter22\n";
        let (result, _, output) = drive(&service, Some("ada@example.com"), script).await;
        result?;
        assert!(output.contains("error: "));
        assert!(output.contains("resend in"));
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_resets_credential() -> Result<()> {
        let service = FakeIdentity::returning("hunter22");
        let script = "424242\n\nf\nnewpass1\nnewpass1\n";
        let (result, flow, _) = drive(&service, Some("ada@example.com"), script).await;
        result?;
        assert_eq!(flow.step(), Step::Authenticated);
        let stored = service.password.lock().map(|stored| stored.clone()).ok().flatten();
        assert_eq!(stored.as_deref(), Some("newpass1"));
        Ok(())
    }

    #[tokio::test]
    async fn command_words_are_valid_passwords() -> Result<()> {
        for password in ["back", "forgot", " padded "] {
            let service = FakeIdentity::returning(password);
            let script = format!("424242\n{password}\n");
            let (result, flow, _) = drive(&service, Some("ada@example.com"), &script).await;
            result?;
            assert_eq!(flow.step(), Step::Authenticated, "password {password:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn empty_password_opens_options() -> Result<()> {
        let service = FakeIdentity::returning("hunter22");
        let script = "424242\n\n\nhunter22\n";
        let (result, flow, output) = drive(&service, Some("ada@example.com"), script).await;
        result?;
        assert_eq!(flow.step(), Step::Authenticated);
        assert!(output.contains("[b]ack, [f]orgot password"));
        assert!(!output.contains("error: "));
        Ok(())
    }

    #[tokio::test]
    async fn empty_display_name_goes_back() -> Result<()> {
        let service = FakeIdentity::default();
        let script = "ada@example.com\n424242\n\nbob@example.com\n424242\nBob\nsecret1\nsecret1\ny\ny\n";
        let (result, flow, _) = drive(&service, None, script).await;
        result?;
        assert_eq!(flow.email(), "bob@example.com");
        assert_eq!(flow.step(), Step::Authenticated);
        Ok(())
    }

    #[tokio::test]
    async fn back_returns_to_email() -> Result<()> {
        let service = FakeIdentity::returning("hunter22");
        let script = "back\nbob@example.com\n424242\nhunter22\n";
        let (result, flow, _) = drive(&service, Some("ada@example.com"), script).await;
        result?;
        assert_eq!(flow.email(), "bob@example.com");
        Ok(())
    }

    #[tokio::test]
    async fn closed_input_is_an_error() {
        let service = FakeIdentity::default();
        let (result, flow, _) = drive(&service, None, "ada@example.com\n").await;
        assert!(result.is_err());
        assert_eq!(flow.step(), Step::Code);
    }

    fn summary(id: i64, title: &str, completed: bool, unlocked: bool) -> LessonSummary {
        LessonSummary {
            id,
            title: title.to_string(),
            description: String::new(),
            display_order: i32::try_from(id).unwrap_or_default(),
            is_free: id == 1,
            block_name: None,
            topics: Vec::new(),
            completed,
            unlocked,
        }
    }

    #[test]
    fn render_lessons_marks_lock_state() {
        let lessons = [
            summary(1, "Intro", true, true),
            summary(2, "Ownership", false, true),
            summary(3, "Traits", false, false),
        ];
        let text = render_lessons(4, &lessons);
        assert!(text.starts_with("Course 4\n"));
        assert!(text.contains("[done] 1. Intro (free)"));
        assert!(text.contains("[open] 2. Ownership"));
        assert!(text.contains("[lock] 3. Traits"));
    }

    #[test]
    fn render_lessons_empty() {
        assert!(render_lessons(9, &[]).contains("no lessons available"));
    }
}
