//! Bearer tokens for the connectivity broker.

use crate::Result;
use adlookup_core::config::ServiceBindings;
use adlookup_core::Error;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error};

const USER_AGENT: &str = concat!("adlookup-connectivity/", env!("CARGO_PKG_VERSION"));

/// Default timeout for token requests.
const TOKEN_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Opaque bearer token.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Exposes the raw token.
    #[must_use]
    pub fn secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Issues tokens for a named service scope.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetches a fresh token for `scope` (for example `connectivity`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TunnelFailure`] if the token cannot be obtained.
    async fn token(&self, scope: &str) -> Result<AccessToken>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// OAuth2 client-credentials provider backed by the application's service bindings.
///
/// The scope names the service binding whose client is used, mirroring how the platform SDKs
/// resolve `serviceToken("connectivity")`. Tokens are fetched on every call.
#[derive(Debug, Clone)]
pub struct ClientCredentialsTokenProvider {
    http: Client,
    bindings: ServiceBindings,
}

impl ClientCredentialsTokenProvider {
    /// Creates a provider for the given bindings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the HTTP client cannot be built.
    pub fn new(bindings: ServiceBindings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(TOKEN_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| Error::ConfigError(format!("Failed to build token HTTP client: {err}")))?;
        Ok(Self { http, bindings })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialsTokenProvider {
    async fn token(&self, scope: &str) -> Result<AccessToken> {
        let credentials = self
            .bindings
            .credentials(scope)
            .map_err(|err| Error::TunnelFailure(err.to_string()))?;
        let endpoint = credentials
            .token_endpoint()
            .map_err(|err| Error::TunnelFailure(err.to_string()))?;
        let client_id = credentials.clientid.as_deref().ok_or_else(|| {
            Error::TunnelFailure(format!("service binding `{scope}` has no clientid"))
        })?;
        let client_secret = credentials.clientsecret.as_ref().ok_or_else(|| {
            Error::TunnelFailure(format!("service binding `{scope}` has no clientsecret"))
        })?;

        debug!(%endpoint, scope, "requesting client-credentials token");

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret()),
        ];
        let response = self.http.post(endpoint).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, scope, "token request rejected");
            return Err(Error::TunnelFailure(format!(
                "token request for `{scope}` failed with status {status}: {body}"
            )));
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(Error::TunnelFailure(format!(
                "token service returned an empty token for `{scope}`"
            )));
        }
        debug!(
            scope,
            token_type = token.token_type.as_deref().unwrap_or("unknown"),
            "token acquired"
        );
        Ok(AccessToken::new(token.access_token))
    }
}
