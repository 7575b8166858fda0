//! Identity provider endpoints: GitHub device flow and the Copilot token
//! exchange.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::config::Endpoints;
use crate::error::AuthError;
use crate::http::{self, sanitize_error_body};

use super::credential::Credential;
use super::device::{DeviceCode, DeviceGrant, PollOutcome};

/// OAuth client id of the Copilot editor integration. Public; the device flow
/// needs no client secret.
pub const COPILOT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";

const OAUTH_SCOPE: &str = "read:user";
const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Operations the device flow and token refresh need from the provider.
///
/// This abstraction allows mocking the provider in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a device flow.
    async fn request_device_code(&self) -> Result<DeviceCode, AuthError>;

    /// Poll the token endpoint once.
    async fn poll_token(&self, device_code: &str) -> Result<PollOutcome, AuthError>;

    /// Trade the long-lived token for a fresh short-lived API credential.
    async fn exchange(&self, refresh_token: &str) -> Result<Credential, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    interval: Option<u64>,
}

#[derive(Deserialize)]
struct CopilotTokenResponse {
    token: String,
    expires_at: Option<i64>,
}

/// GitHub as identity provider for the Copilot API.
pub struct GitHubIdentityProvider {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl GitHubIdentityProvider {
    pub fn new(client: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }
}

#[async_trait]
impl IdentityProvider for GitHubIdentityProvider {
    async fn request_device_code(&self) -> Result<DeviceCode, AuthError> {
        let url = format!("{}/login/device/code", self.endpoints.github_url);
        let resp = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[("client_id", COPILOT_CLIENT_ID), ("scope", OAUTH_SCOPE)])
            .send()
            .await
            .map_err(AuthError::Http)?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ProviderStatus {
                status,
                body: sanitize_error_body(&body),
            });
        }

        resp.json().await.map_err(AuthError::Http)
    }

    async fn poll_token(&self, device_code: &str) -> Result<PollOutcome, AuthError> {
        let url = format!("{}/login/oauth/access_token", self.endpoints.github_url);
        let resp = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", COPILOT_CLIENT_ID),
                ("device_code", device_code),
                ("grant_type", DEVICE_GRANT_TYPE),
            ])
            .send()
            .await
            .map_err(AuthError::Http)?;

        let token: TokenResponse = resp.json().await.map_err(AuthError::Http)?;
        parse_poll_response(token)
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Credential, AuthError> {
        let url = format!(
            "{}/copilot_internal/v2/token",
            self.endpoints.github_api_url
        );
        let resp = http::with_editor_headers(self.client.get(&url))
            .header("Authorization", format!("token {}", refresh_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(AuthError::Http)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::AuthExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ProviderStatus {
                status: status.as_u16(),
                body: sanitize_error_body(&body),
            });
        }

        let token: CopilotTokenResponse = resp.json().await.map_err(AuthError::Http)?;
        let expires_at = token
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        debug!("Exchanged token, expires at {:?}", expires_at);

        Ok(Credential {
            access_token: token.token,
            token_type: "bearer".to_string(),
            expires_at,
            refresh_token: Some(refresh_token.to_string()),
            scope: OAUTH_SCOPE.to_string(),
        })
    }
}

/// Map a token endpoint response to a poll outcome.
fn parse_poll_response(token: TokenResponse) -> Result<PollOutcome, AuthError> {
    if let Some(access_token) = token.access_token.filter(|t| !t.is_empty()) {
        return Ok(PollOutcome::Success(DeviceGrant {
            access_token,
            token_type: token.token_type.unwrap_or_else(|| "bearer".to_string()),
            scope: token.scope.unwrap_or_default(),
        }));
    }

    match token.error.as_deref() {
        Some("authorization_pending") => Ok(PollOutcome::Pending),
        Some("slow_down") => Ok(PollOutcome::SlowDown {
            interval: token.interval,
        }),
        Some("expired_token") => Ok(PollOutcome::Expired),
        Some("access_denied") => Ok(PollOutcome::AccessDenied),
        Some(other) => Err(AuthError::ProviderError(
            token
                .error_description
                .unwrap_or_else(|| other.to_string()),
        )),
        None => Err(AuthError::ProviderError(
            "token response had neither a token nor an error".to_string(),
        )),
    }
}
