//! OAuth device authorization flow.
//!
//! The poll loop sleeps for the provider interval between attempts, never
//! polls at or after the session expiry, and checks a cancellation signal
//! before and during every wait.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AuthError;

use super::provider::IdentityProvider;

/// Interval bump applied on `slow_down` when the provider names no new interval.
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

fn default_interval() -> u64 {
    5
}

/// Device and user codes returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

/// Token granted at the end of a successful device flow.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceGrant {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
}

impl std::fmt::Debug for DeviceGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceGrant")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Result of one poll of the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    /// The provider asked us to back off, optionally naming the new interval
    /// in seconds.
    SlowDown { interval: Option<u64> },
    Success(DeviceGrant),
    Expired,
    AccessDenied,
}

/// In-memory state of one device-flow attempt. Never persisted.
#[derive(Debug)]
pub struct DeviceSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    interval: Duration,
    expires_at: Instant,
}

impl DeviceSession {
    /// Start a session from the provider's device code response.
    pub fn start(code: DeviceCode) -> Self {
        Self {
            expires_at: Instant::now() + Duration::from_secs(code.expires_in),
            interval: Duration::from_secs(code.interval),
            device_code: code.device_code,
            user_code: code.user_code,
            verification_uri: code.verification_uri,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Lengthen the poll interval. The result is always strictly longer.
    fn slow_down(&mut self, requested_secs: Option<u64>) {
        let bumped = self.interval + SLOW_DOWN_INCREMENT;
        self.interval = requested_secs
            .map(Duration::from_secs)
            .filter(|requested| *requested > bumped)
            .unwrap_or(bumped);
        debug!("Provider asked to slow down, polling every {:?}", self.interval);
    }
}

/// What the user needs to complete authorization on another device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInstructions {
    pub verification_uri: String,
    pub user_code: String,
}

/// UI hook for the device flow.
pub trait DeviceFlowDisplay {
    /// Called once the user should visit the URL and enter the code.
    fn show_instructions(&mut self, instructions: &AuthInstructions);
}

/// Poll the token endpoint until the session yields a grant or ends.
pub async fn poll_for_grant<P>(
    provider: &P,
    session: &mut DeviceSession,
    cancel: &CancellationToken,
) -> Result<DeviceGrant, AuthError>
where
    P: IdentityProvider + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            _ = tokio::time::sleep(session.interval) => {}
        }

        if session.is_expired() {
            debug!("Device code expired before authorization completed");
            return Err(AuthError::AuthExpired);
        }

        let outcome = match provider.poll_token(&session.device_code).await {
            Ok(outcome) => outcome,
            Err(AuthError::Http(e)) => {
                warn!("Token poll failed, retrying: {}", e);
                PollOutcome::Pending
            }
            Err(e) => return Err(e),
        };

        match outcome {
            PollOutcome::Pending => continue,
            PollOutcome::SlowDown { interval } => session.slow_down(interval),
            PollOutcome::Success(grant) => return Ok(grant),
            PollOutcome::Expired => return Err(AuthError::AuthExpired),
            PollOutcome::AccessDenied => return Err(AuthError::AuthDenied),
        }
    }
}
