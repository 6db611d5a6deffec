//! HTTP client for the coursegate API.
//!
//! [`ApiClient`] implements the sign-in flow's [`IdentityService`] and
//! [`ProfileDirectory`] against the auth endpoints and keeps the session token
//! it is handed along the way: first the `otp` token from code verification,
//! then the full session that replaces it.
//!
//! [`IdentityService`]: crate::flow::IdentityService
//! [`ProfileDirectory`]: crate::flow::ProfileDirectory

mod catalog;
mod identity;

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use url::Url;

use crate::APP_USER_AGENT;
use crate::flow::IdentityError;

pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: RwLock<Option<SecretString>>,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API URL: {base_url}"))?;
        // Relative joins keep any path prefix only when the base ends in `/`.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            session: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Whether a session token (of either kind) is held.
    pub async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub async fn clear_session(&self) {
        self.session.write().await.take();
    }

    async fn store_session(&self, token: String) {
        *self.session.write().await = Some(SecretString::from(token));
    }

    fn endpoint(&self, path: &str) -> Result<Url, IdentityError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| IdentityError::Network(err.to_string()))
    }

    /// Attach the held session, if any, as a bearer token.
    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.read().await.as_ref() {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}
