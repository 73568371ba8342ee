//! OAuth2 password-grant client for the external identity provider.
//!
//! Authwarden never mints tokens; the login route forwards credentials here
//! and relays the provider's answer. Rejections feed the lockout tracker.

use crate::client::http::build_user_agent;
use crate::config::IdentityProviderConfig;
use crate::AuthwardenError;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token pair returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Bearer access token.
    pub access_token: String,

    /// Refresh token, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,

    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Identity provider HTTP client.
pub struct IdentityProviderClient {
    client: Client,
    config: IdentityProviderConfig,
    user_agent: String,
}

impl IdentityProviderClient {
    /// Create a client for the configured token endpoint.
    pub fn new(
        app_name: &str,
        config: IdentityProviderConfig,
        timeout: Duration,
    ) -> Result<Self, AuthwardenError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthwardenError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            user_agent: build_user_agent(app_name),
        })
    }

    /// Exchange a username and password for a token pair.
    ///
    /// # Errors
    /// - `InvalidCredentials` - provider answered 400 or 401
    /// - `IdentityProviderTransport` - network failure, other status, or bad body
    pub fn password_grant(&self, username: &str, password: &str) -> Result<TokenGrant, AuthwardenError> {
        let form = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", username),
            ("password", password),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .header(USER_AGENT, &self.user_agent)
            .form(&form)
            .send()
            .map_err(|e| AuthwardenError::IdentityProviderTransport(format!("Request failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => response.json::<TokenGrant>().map_err(|e| {
                AuthwardenError::IdentityProviderTransport(format!("Bad token response: {}", e))
            }),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(AuthwardenError::InvalidCredentials),
            status => Err(AuthwardenError::IdentityProviderTransport(format!(
                "Token endpoint returned {}",
                status
            ))),
        }
    }

    /// Token endpoint URL.
    pub fn token_url(&self) -> &str {
        &self.config.token_url
    }
}
