//! The sign-in state machine.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::countdown::ResendCountdown;
use super::identity::{IdentityError, IdentityService, ProfileDirectory};
use super::otp::{OtpInput, is_valid_code};
use super::validation::{
    PasswordReset, Registration, ValidationError, normalize_email, valid_email,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Email,
    Code,
    Register,
    Password,
    Reset,
    Authenticated,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Email => "email",
            Self::Code => "code",
            Self::Register => "register",
            Self::Password => "password",
            Self::Reset => "reset",
            Self::Authenticated => "authenticated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("Wait {remaining_secs} seconds before requesting a new code")]
    ResendCooldown { remaining_secs: u64 },
    #[error("Action not available in the {actual} step")]
    InvalidStep { actual: Step },
}

/// One sign-in attempt, from email entry to an authenticated session.
///
/// Operations take `&mut self`, so each step's remote call completes before
/// the next transition can start. A failed operation leaves the step
/// unchanged and stores a message for display.
#[derive(Debug)]
pub struct LoginFlow {
    step: Step,
    email: String,
    is_new_user: bool,
    code_verified: bool,
    otp: OtpInput,
    countdown: ResendCountdown,
    error: Option<String>,
    success: Option<String>,
}

impl Default for LoginFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginFlow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            step: Step::Email,
            email: String::new(),
            is_new_user: false,
            code_verified: false,
            otp: OtpInput::new(),
            countdown: ResendCountdown::default(),
            error: None,
            success: None,
        }
    }

    #[must_use]
    pub fn with_resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.countdown = ResendCountdown::new(cooldown);
        self
    }

    #[must_use]
    pub fn step(&self) -> Step {
        self.step
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn is_new_user(&self) -> bool {
        self.is_new_user
    }

    #[must_use]
    pub fn code_verified(&self) -> bool {
        self.code_verified
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn success(&self) -> Option<&str> {
        self.success.as_deref()
    }

    #[must_use]
    pub fn otp(&self) -> &OtpInput {
        &self.otp
    }

    pub fn otp_mut(&mut self) -> &mut OtpInput {
        &mut self.otp
    }

    #[must_use]
    pub fn resend_remaining_secs(&self, now: Instant) -> u64 {
        self.countdown.remaining_secs(now)
    }

    /// Submit the address, look up the profile and send a code.
    ///
    /// # Errors
    /// Invalid email, or a failed lookup/send; the step stays `Email`.
    pub async fn submit_email<S>(
        &mut self,
        service: &S,
        email: &str,
        now: Instant,
    ) -> Result<Step, FlowError>
    where
        S: IdentityService + ProfileDirectory,
    {
        self.expect_step(Step::Email)?;
        self.clear_messages();

        let email = normalize_email(email);
        if !valid_email(&email) {
            return self.fail(ValidationError::InvalidEmail.into());
        }

        let exists = match service.profile_exists(&email).await {
            Ok(exists) => exists,
            Err(err) => return self.fail(err.into()),
        };
        if let Err(err) = service.request_one_time_code(&email).await {
            return self.fail(err.into());
        }

        debug!(email = %email, is_new_user = !exists, "one-time code requested");
        self.email = email;
        self.is_new_user = !exists;
        self.code_verified = false;
        self.otp.clear();
        self.countdown.start(now);
        self.success = Some(format!("We sent a code to {}", self.email));
        Ok(self.transition(Step::Code))
    }

    /// Verify the six digits currently in the code boxes.
    ///
    /// # Errors
    /// Incomplete code (no network call) or a rejected code; stays in `Code`.
    pub async fn submit_code<S: IdentityService>(&mut self, service: &S) -> Result<Step, FlowError> {
        self.expect_step(Step::Code)?;
        self.clear_messages();

        let Some(code) = self.otp.code().filter(|code| is_valid_code(code)) else {
            return self.fail(ValidationError::IncompleteCode.into());
        };

        if let Err(err) = service.verify_one_time_code(&self.email, &code).await {
            warn!(email = %self.email, "one-time code rejected");
            return self.fail(err.into());
        }

        self.code_verified = true;
        let next = if self.is_new_user {
            Step::Register
        } else {
            Step::Password
        };
        Ok(self.transition(next))
    }

    /// Send a fresh code once the countdown has run out.
    ///
    /// # Errors
    /// Countdown still running (no network call) or a failed send.
    pub async fn resend_code<S: IdentityService>(
        &mut self,
        service: &S,
        now: Instant,
    ) -> Result<Step, FlowError> {
        self.expect_step(Step::Code)?;
        self.clear_messages();

        let remaining_secs = self.countdown.remaining_secs(now);
        if remaining_secs > 0 {
            return self.fail(FlowError::ResendCooldown { remaining_secs });
        }
        if let Err(err) = service.request_one_time_code(&self.email).await {
            return self.fail(err.into());
        }

        self.otp.clear();
        self.countdown.start(now);
        self.success = Some(format!("We sent a new code to {}", self.email));
        Ok(self.step)
    }

    /// Create the credential and profile for a new user.
    ///
    /// # Errors
    /// Invalid form (no network call) or a failed remote call; stays in `Register`.
    pub async fn submit_registration<S>(
        &mut self,
        service: &S,
        form: &Registration,
    ) -> Result<Step, FlowError>
    where
        S: IdentityService + ProfileDirectory,
    {
        self.expect_verified_step(Step::Register)?;
        self.clear_messages();

        if let Err(err) = form.validate() {
            return self.fail(err.into());
        }
        if let Err(err) = service.set_password(&form.password).await {
            return self.fail(err.into());
        }
        if let Err(err) = service.upsert_profile(form.display_name.trim()).await {
            return self.fail(err.into());
        }

        info!(email = %self.email, "registration completed");
        Ok(self.transition(Step::Authenticated))
    }

    /// Sign a returning user in with their password.
    ///
    /// # Errors
    /// Empty password (no network call) or a rejected sign-in; stays in `Password`.
    pub async fn submit_password<S: IdentityService>(
        &mut self,
        service: &S,
        password: &SecretString,
    ) -> Result<Step, FlowError> {
        self.expect_verified_step(Step::Password)?;
        self.clear_messages();

        if password.expose_secret().is_empty() {
            return self.fail(ValidationError::MissingPassword.into());
        }
        if let Err(err) = service.sign_in_with_password(&self.email, password).await {
            return self.fail(err.into());
        }

        info!(email = %self.email, "signed in");
        Ok(self.transition(Step::Authenticated))
    }

    /// # Errors
    /// Only available from the `Password` step.
    pub fn forgot_password(&mut self) -> Result<Step, FlowError> {
        self.expect_verified_step(Step::Password)?;
        Ok(self.transition(Step::Reset))
    }

    /// Replace the credential and sign in.
    ///
    /// # Errors
    /// Invalid form (no network call) or a failed update; stays in `Reset`.
    pub async fn submit_reset<S: IdentityService>(
        &mut self,
        service: &S,
        form: &PasswordReset,
    ) -> Result<Step, FlowError> {
        self.expect_verified_step(Step::Reset)?;
        self.clear_messages();

        if let Err(err) = form.validate() {
            return self.fail(err.into());
        }
        if let Err(err) = service.set_password(&form.password).await {
            return self.fail(err.into());
        }

        info!(email = %self.email, "password reset");
        Ok(self.transition(Step::Authenticated))
    }

    /// Step back; always clears messages.
    ///
    /// Leaving for `Email` drops the code and its verification, since a
    /// different address may be entered next.
    ///
    /// # Errors
    /// There is nothing before `Email` and nothing after `Authenticated`.
    pub fn back(&mut self) -> Result<Step, FlowError> {
        let previous = match self.step {
            Step::Code | Step::Register | Step::Password => Step::Email,
            Step::Reset => Step::Password,
            Step::Email | Step::Authenticated => {
                return self.fail(FlowError::InvalidStep { actual: self.step });
            }
        };

        if previous == Step::Email {
            self.otp.clear();
            self.countdown.reset();
            self.code_verified = false;
        }
        Ok(self.transition(previous))
    }

    /// A refused action is reported like any other failure.
    fn expect_step(&mut self, expected: Step) -> Result<(), FlowError> {
        if self.step == expected {
            Ok(())
        } else {
            self.fail(FlowError::InvalidStep { actual: self.step })
                .map(drop)
        }
    }

    fn expect_verified_step(&mut self, expected: Step) -> Result<(), FlowError> {
        self.expect_step(expected)?;
        if self.code_verified {
            Ok(())
        } else {
            self.fail(FlowError::InvalidStep { actual: self.step })
                .map(drop)
        }
    }

    fn transition(&mut self, next: Step) -> Step {
        if next != self.step {
            debug!(from = %self.step, to = %next, "login flow transition");
        }
        if next != Step::Code {
            self.success = None;
        }
        self.error = None;
        self.step = next;
        next
    }

    fn clear_messages(&mut self) {
        self.error = None;
        self.success = None;
    }

    fn fail(&mut self, err: FlowError) -> Result<Step, FlowError> {
        self.error = Some(err.to_string());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GOOD_CODE: &str = "424242";

    #[derive(Default)]
    struct FakeIdentity {
        existing: Vec<String>,
        password: String,
        fail_lookup: bool,
        requests: AtomicUsize,
        verifications: AtomicUsize,
        sign_ins: AtomicUsize,
        passwords_set: AtomicUsize,
        profile: Mutex<Option<String>>,
    }

    impl FakeIdentity {
        fn with_user(email: &str, password: &str) -> Self {
            Self {
                existing: vec![email.to_string()],
                password: password.to_string(),
                ..Self::default()
            }
        }
    }

    impl IdentityService for FakeIdentity {
        async fn request_one_time_code(&self, _email: &str) -> Result<(), IdentityError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn verify_one_time_code(&self, _email: &str, code: &str) -> Result<(), IdentityError> {
            self.verifications.fetch_add(1, Ordering::SeqCst);
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
            self.sign_ins.fetch_add(1, Ordering::SeqCst);
            if password.expose_secret() == self.password {
                Ok(())
            } else {
                Err(IdentityError::WrongPassword)
            }
        }

        async fn set_password(&self, _password: &SecretString) -> Result<(), IdentityError> {
            self.passwords_set.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl ProfileDirectory for FakeIdentity {
        async fn profile_exists(&self, email: &str) -> Result<bool, IdentityError> {
            if self.fail_lookup {
                return Err(IdentityError::Network("connection refused".to_string()));
            }
            Ok(self.existing.iter().any(|existing| existing == email))
        }

        async fn upsert_profile(&self, display_name: &str) -> Result<(), IdentityError> {
            if let Ok(mut profile) = self.profile.lock() {
                *profile = Some(display_name.to_string());
            }
            Ok(())
        }
    }

    fn registration(password: &str, confirmation: &str) -> Registration {
        Registration {
            display_name: " Ada ".to_string(),
            password: SecretString::from(password),
            confirmation: SecretString::from(confirmation),
            accepted_terms: true,
            accepted_privacy: true,
        }
    }

    async fn at_code(service: &FakeIdentity, email: &str) -> LoginFlow {
        let mut flow = LoginFlow::new();
        let step = flow.submit_email(service, email, Instant::now()).await;
        assert_eq!(step, Ok(Step::Code));
        flow
    }

    #[tokio::test]
    async fn new_user_goes_to_register() {
        let service = FakeIdentity::default();
        let mut flow = at_code(&service, " New@Example.com ").await;
        assert_eq!(flow.email(), "new@example.com");
        assert!(flow.is_new_user());
        assert_eq!(service.requests.load(Ordering::SeqCst), 1);

        flow.otp_mut().input(0, GOOD_CODE);
        assert_eq!(flow.submit_code(&service).await, Ok(Step::Register));

        let step = flow
            .submit_registration(&service, &registration("secret1", "secret1"))
            .await;
        assert_eq!(step, Ok(Step::Authenticated));
        assert_eq!(service.passwords_set.load(Ordering::SeqCst), 1);
        let profile = service.profile.lock().ok().and_then(|p| p.clone());
        assert_eq!(profile.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn returning_user_goes_to_password() {
        let service = FakeIdentity::with_user("ada@example.com", "hunter22");
        let mut flow = at_code(&service, "ada@example.com").await;
        assert!(!flow.is_new_user());

        flow.otp_mut().input(0, GOOD_CODE);
        assert_eq!(flow.submit_code(&service).await, Ok(Step::Password));

        let wrong = flow
            .submit_password(&service, &SecretString::from("nope"))
            .await;
        assert_eq!(wrong, Err(FlowError::Identity(IdentityError::WrongPassword)));
        assert_eq!(flow.step(), Step::Password);
        assert_eq!(flow.error(), Some("Incorrect password"));

        let right = flow
            .submit_password(&service, &SecretString::from("hunter22"))
            .await;
        assert_eq!(right, Ok(Step::Authenticated));
        assert_eq!(flow.error(), None);
    }

    #[tokio::test]
    async fn wrong_code_stays_in_code_step() {
        let service = FakeIdentity::default();
        let mut flow = at_code(&service, "new@example.com").await;

        flow.otp_mut().input(0, "000000");
        let result = flow.submit_code(&service).await;
        assert_eq!(result, Err(FlowError::Identity(IdentityError::InvalidCode)));
        assert_eq!(flow.step(), Step::Code);
        assert!(!flow.code_verified());
        assert!(flow.error().is_some());
    }

    #[tokio::test]
    async fn incomplete_code_never_reaches_the_service() {
        let service = FakeIdentity::default();
        let mut flow = at_code(&service, "new@example.com").await;

        flow.otp_mut().input(0, "123");
        let result = flow.submit_code(&service).await;
        assert_eq!(
            result,
            Err(FlowError::Validation(ValidationError::IncompleteCode))
        );
        assert_eq!(service.verifications.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn credential_steps_unreachable_without_code() {
        let service = FakeIdentity::with_user("ada@example.com", "hunter22");
        let mut flow = LoginFlow::new();

        let result = flow
            .submit_password(&service, &SecretString::from("hunter22"))
            .await;
        assert_eq!(result, Err(FlowError::InvalidStep { actual: Step::Email }));
        assert_eq!(flow.error(), Some("Action not available in the email step"));
        let result = flow
            .submit_registration(&service, &registration("secret1", "secret1"))
            .await;
        assert!(result.is_err());
        assert!(flow.forgot_password().is_err());
        assert_eq!(service.sign_ins.load(Ordering::SeqCst), 0);
        assert_eq!(service.passwords_set.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_email_stays_on_email() {
        let service = FakeIdentity::default();
        let mut flow = LoginFlow::new();
        let result = flow.submit_email(&service, "nope", Instant::now()).await;
        assert_eq!(
            result,
            Err(FlowError::Validation(ValidationError::InvalidEmail))
        );
        assert_eq!(flow.step(), Step::Email);
        assert_eq!(service.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_lookup_stays_on_email() {
        let service = FakeIdentity {
            fail_lookup: true,
            ..FakeIdentity::default()
        };
        let mut flow = LoginFlow::new();
        let result = flow
            .submit_email(&service, "ada@example.com", Instant::now())
            .await;
        assert!(matches!(
            result,
            Err(FlowError::Identity(IdentityError::Network(_)))
        ));
        assert_eq!(flow.step(), Step::Email);
        assert_eq!(service.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resend_respects_countdown() {
        let service = FakeIdentity::default();
        let start = Instant::now();
        let mut flow = LoginFlow::new().with_resend_cooldown(Duration::from_secs(60));
        flow.submit_email(&service, "new@example.com", start)
            .await
            .ok();

        let early = flow
            .resend_code(&service, start + Duration::from_secs(10))
            .await;
        assert_eq!(early, Err(FlowError::ResendCooldown { remaining_secs: 50 }));
        assert_eq!(service.requests.load(Ordering::SeqCst), 1);

        let later = start + Duration::from_secs(61);
        assert_eq!(flow.resend_code(&service, later).await, Ok(Step::Code));
        assert_eq!(service.requests.load(Ordering::SeqCst), 2);
        assert_eq!(flow.resend_remaining_secs(later), 60);
    }

    #[tokio::test]
    async fn back_from_code_clears_code_and_messages() {
        let service = FakeIdentity::default();
        let mut flow = at_code(&service, "new@example.com").await;
        flow.otp_mut().input(0, "000000");
        flow.submit_code(&service).await.ok();
        assert!(flow.error().is_some());

        assert_eq!(flow.back(), Ok(Step::Email));
        assert_eq!(flow.error(), None);
        assert_eq!(flow.success(), None);
        assert_eq!(flow.otp().code(), None);
        assert_eq!(flow.resend_remaining_secs(Instant::now()), 0);
    }

    #[tokio::test]
    async fn back_to_email_drops_verification() {
        let service = FakeIdentity::with_user("ada@example.com", "hunter22");
        let mut flow = at_code(&service, "ada@example.com").await;
        flow.otp_mut().input(0, GOOD_CODE);
        flow.submit_code(&service).await.ok();
        assert_eq!(flow.back(), Ok(Step::Email));
        assert!(!flow.code_verified());
        assert_eq!(flow.error(), None);
        assert!(flow.back().is_err());
        assert_eq!(flow.error(), Some("Action not available in the email step"));
    }

    #[tokio::test]
    async fn forgot_password_then_reset() {
        let service = FakeIdentity::with_user("ada@example.com", "hunter22");
        let mut flow = at_code(&service, "ada@example.com").await;
        flow.otp_mut().input(0, GOOD_CODE);
        flow.submit_code(&service).await.ok();

        assert_eq!(flow.forgot_password(), Ok(Step::Reset));
        assert_eq!(flow.back(), Ok(Step::Password));
        assert!(flow.code_verified());
        assert_eq!(flow.forgot_password(), Ok(Step::Reset));

        let mismatch = PasswordReset {
            password: SecretString::from("newpass1"),
            confirmation: SecretString::from("newpass2"),
        };
        assert_eq!(
            flow.submit_reset(&service, &mismatch).await,
            Err(FlowError::Validation(ValidationError::PasswordMismatch))
        );
        assert_eq!(service.passwords_set.load(Ordering::SeqCst), 0);

        let reset = PasswordReset {
            password: SecretString::from("newpass1"),
            confirmation: SecretString::from("newpass1"),
        };
        assert_eq!(
            flow.submit_reset(&service, &reset).await,
            Ok(Step::Authenticated)
        );
        assert_eq!(service.passwords_set.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_registration_never_sets_password() {
        let service = FakeIdentity::default();
        let mut flow = at_code(&service, "new@example.com").await;
        flow.otp_mut().input(0, GOOD_CODE);
        flow.submit_code(&service).await.ok();

        let result = flow
            .submit_registration(&service, &registration("secret1", "other11"))
            .await;
        assert_eq!(
            result,
            Err(FlowError::Validation(ValidationError::PasswordMismatch))
        );
        assert_eq!(flow.step(), Step::Register);
        assert_eq!(service.passwords_set.load(Ordering::SeqCst), 0);
    }
}
