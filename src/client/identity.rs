use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use super::ApiClient;
use crate::api::handlers::auth::types::{OtpVerifyResponse, TokenResponse};
use crate::api::handlers::profiles::ProfileLookupResponse;
use crate::flow::{IdentityError, IdentityService, ProfileDirectory};

/// Which call produced a non-success status; the same status means
/// different things on different endpoints.
#[derive(Clone, Copy, Debug)]
enum Call {
    RequestCode,
    VerifyCode,
    Login,
    SetPassword,
    LookupProfile,
    UpdateProfile,
}

fn map_status(call: Call, status: StatusCode, body: &str) -> IdentityError {
    let body = body.trim();
    match (call, status) {
        (_, StatusCode::TOO_MANY_REQUESTS) => IdentityError::RateLimited,
        (Call::VerifyCode, StatusCode::BAD_REQUEST) => IdentityError::InvalidCode,
        (Call::Login, StatusCode::UNAUTHORIZED) if body == "Incorrect password" => {
            IdentityError::WrongPassword
        }
        (Call::Login | Call::SetPassword | Call::UpdateProfile, StatusCode::UNAUTHORIZED) => {
            IdentityError::NotVerified
        }
        _ if body.is_empty() => IdentityError::Rejected(format!("Request failed ({status})")),
        _ => IdentityError::Rejected(body.to_string()),
    }
}

fn network(err: &reqwest::Error) -> IdentityError {
    IdentityError::Network(err.to_string())
}

/// Turn a non-success response into an [`IdentityError`].
async fn check(call: Call, response: Response) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(?call, %status, "identity call rejected");
    Err(map_status(call, status, &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, IdentityError> {
    response.json::<T>().await.map_err(|err| network(&err))
}

impl IdentityService for ApiClient {
    #[instrument(skip(self))]
    async fn request_one_time_code(&self, email: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .post(self.endpoint("v1/auth/otp")?)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(|err| network(&err))?;
        check(Call::RequestCode, response).await?;
        Ok(())
    }

    #[instrument(skip(self, code))]
    async fn verify_one_time_code(&self, email: &str, code: &str) -> Result<(), IdentityError> {
        let response = self
            .http
            .post(self.endpoint("v1/auth/otp/verify")?)
            .json(&json!({ "email": email, "code": code }))
            .send()
            .await
            .map_err(|err| network(&err))?;
        let verified: OtpVerifyResponse = decode(check(Call::VerifyCode, response).await?).await?;
        self.store_session(verified.session_token).await;
        Ok(())
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<(), IdentityError> {
        let request = self
            .http
            .post(self.endpoint("v1/auth/login")?)
            .json(&json!({ "email": email, "password": password.expose_secret() }));
        let response = self
            .authorized(request)
            .await
            .send()
            .await
            .map_err(|err| network(&err))?;
        let issued: TokenResponse = decode(check(Call::Login, response).await?).await?;
        self.store_session(issued.session_token).await;
        Ok(())
    }

    #[instrument(skip(self, password))]
    async fn set_password(&self, password: &SecretString) -> Result<(), IdentityError> {
        let request = self
            .http
            .post(self.endpoint("v1/auth/password")?)
            .json(&json!({ "password": password.expose_secret() }));
        let response = self
            .authorized(request)
            .await
            .send()
            .await
            .map_err(|err| network(&err))?;
        let response = check(Call::SetPassword, response).await?;
        // 200 upgrades a code-verified session; 204 leaves a full session as is.
        if response.status() == StatusCode::OK {
            let issued: TokenResponse = decode(response).await?;
            self.store_session(issued.session_token).await;
        }
        Ok(())
    }
}

impl ProfileDirectory for ApiClient {
    #[instrument(skip(self))]
    async fn profile_exists(&self, email: &str) -> Result<bool, IdentityError> {
        let response = self
            .http
            .post(self.endpoint("v1/profiles/lookup")?)
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(|err| network(&err))?;
        let lookup: ProfileLookupResponse =
            decode(check(Call::LookupProfile, response).await?).await?;
        Ok(lookup.exists)
    }

    #[instrument(skip(self))]
    async fn upsert_profile(&self, display_name: &str) -> Result<(), IdentityError> {
        let request = self
            .http
            .put(self.endpoint("v1/me/profile")?)
            .json(&json!({ "display_name": display_name }));
        let response = self
            .authorized(request)
            .await
            .send()
            .await
            .map_err(|err| network(&err))?;
        check(Call::UpdateProfile, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    // Nothing listens on the discard port.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    #[test]
    fn verify_bad_request_is_invalid_code() {
        assert_eq!(
            map_status(Call::VerifyCode, StatusCode::BAD_REQUEST, "Invalid or expired code"),
            IdentityError::InvalidCode
        );
    }

    #[test]
    fn login_unauthorized_distinguishes_password_from_verification() {
        assert_eq!(
            map_status(Call::Login, StatusCode::UNAUTHORIZED, "Incorrect password"),
            IdentityError::WrongPassword
        );
        assert_eq!(
            map_status(
                Call::Login,
                StatusCode::UNAUTHORIZED,
                "Verify your email with a one-time code first"
            ),
            IdentityError::NotVerified
        );
    }

    #[test]
    fn rate_limit_maps_on_every_call() {
        for call in [Call::RequestCode, Call::VerifyCode, Call::Login] {
            assert_eq!(
                map_status(call, StatusCode::TOO_MANY_REQUESTS, "Rate limited"),
                IdentityError::RateLimited
            );
        }
    }

    #[test]
    fn other_failures_carry_the_body() {
        assert_eq!(
            map_status(Call::RequestCode, StatusCode::BAD_REQUEST, "Invalid email\n"),
            IdentityError::Rejected("Invalid email".to_string())
        );
        assert!(matches!(
            map_status(Call::LookupProfile, StatusCode::INTERNAL_SERVER_ERROR, ""),
            IdentityError::Rejected(message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() -> Result<()> {
        let client = ApiClient::new(UNREACHABLE)?;
        let result = client.profile_exists("ada@example.com").await;
        assert!(matches!(result, Err(IdentityError::Network(_))));
        let result = client.request_one_time_code("ada@example.com").await;
        assert!(matches!(result, Err(IdentityError::Network(_))));
        Ok(())
    }
}
