//! Reqwest-based HTTP client for the published signing-key set.
//!
//! One blocking GET per call. The request is bounded by the configured
//! timeout so an unresponsive identity provider cannot stall a worker
//! indefinitely.

use crate::config::TokenConfig;
use crate::protocol::models::{parse_key_set, KeySet};
use crate::AuthwardenError;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;
use tracing::debug;

/// Key-set (JWKS) HTTP client.
pub struct KeySetClient {
    client: Client,
    url: String,
    user_agent: String,
    timeout: Duration,
}

impl KeySetClient {
    /// Create a client for the configured key-set endpoint.
    pub fn new(app_name: &str, config: &TokenConfig) -> Result<Self, AuthwardenError> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| AuthwardenError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.jwks_url.clone(),
            user_agent: build_user_agent(app_name),
            timeout: config.fetch_timeout,
        })
    }

    /// Fetch and decode the key set.
    ///
    /// # Errors
    /// `KeySetFetch` on transport failure, non-success status, or malformed JSON.
    pub fn fetch(&self) -> Result<KeySet, AuthwardenError> {
        debug!(url = %self.url, "Fetching signing key set");

        let response = self
            .client
            .get(&self.url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| AuthwardenError::KeySetFetch(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthwardenError::KeySetFetch(format!(
                "Key set endpoint returned {}",
                status
            )));
        }

        let body = response
            .bytes()
            .map_err(|e| AuthwardenError::KeySetFetch(format!("Failed to read body: {}", e)))?;

        let set = parse_key_set(&body)?;
        debug!(keys = set.len(), "Fetched signing key set");
        Ok(set)
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Build a User-Agent string.
///
/// Format: `<app>/authwarden-<version>`
pub fn build_user_agent(app_name: &str) -> String {
    format!("{}/authwarden-{}", app_name, env!("CARGO_PKG_VERSION"))
}
