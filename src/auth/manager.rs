//! Token lifecycle: device-flow sign-in, cached credential validation, refresh.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AuthError;

use super::credential::{CacheLock, Credential, CredentialStore};
use super::device::{AuthInstructions, DeviceFlowDisplay, DeviceSession, poll_for_grant};
use super::provider::{GitHubIdentityProvider, IdentityProvider};

/// Something that can hand out a usable credential.
///
/// The completion client and model catalog depend on this rather than on
/// [`AuthManager`] directly so they can be tested with a fixed token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A credential that is valid right now.
    async fn valid_token(&self) -> Result<Credential, AuthError>;

    /// A freshly refreshed credential, regardless of the cached expiry.
    async fn refreshed_token(&self) -> Result<Credential, AuthError>;
}

/// Drives the device flow and keeps the cached credential usable.
pub struct AuthManager<P: IdentityProvider = GitHubIdentityProvider> {
    provider: P,
    store: CredentialStore,
}

impl<P: IdentityProvider> AuthManager<P> {
    pub fn new(provider: P, store: CredentialStore) -> Self {
        Self { provider, store }
    }

    /// Run the device flow to completion.
    ///
    /// Nothing is written to the cache unless the flow succeeds and was not
    /// cancelled.
    pub async fn authenticate(
        &self,
        display: &mut dyn DeviceFlowDisplay,
        cancel: &CancellationToken,
    ) -> Result<Credential, AuthError> {
        let code = self.provider.request_device_code().await?;
        let mut session = DeviceSession::start(code);

        display.show_instructions(&AuthInstructions {
            verification_uri: session.verification_uri.clone(),
            user_code: session.user_code.clone(),
        });

        let grant = poll_for_grant(&self.provider, &mut session, cancel).await?;
        drop(session);

        let credential = self.provider.exchange(&grant.access_token).await?;
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let lock = self.store.lock_async().await?;
        self.store.save(&lock, &credential)?;
        info!("Authenticated; credential cached at {}", self.store.path().display());
        Ok(credential)
    }

    /// Return a credential usable immediately, refreshing once if it expired.
    pub async fn get_valid_token(&self) -> Result<Credential, AuthError> {
        let lock = self.store.lock_async().await?;
        let credential = self
            .store
            .load(&lock)?
            .ok_or(AuthError::NotAuthenticated)?;

        if !credential.is_expired() {
            return Ok(credential);
        }

        debug!("Cached credential expired, refreshing");
        self.refresh_locked(&lock, &credential).await
    }

    /// Refresh the cached credential even if it has not expired yet.
    pub async fn force_refresh(&self) -> Result<Credential, AuthError> {
        let lock = self.store.lock_async().await?;
        let credential = self
            .store
            .load(&lock)?
            .ok_or(AuthError::NotAuthenticated)?;
        self.refresh_locked(&lock, &credential).await
    }

    /// The cached credential, if any, without refreshing it.
    pub fn status(&self) -> Result<Option<Credential>, AuthError> {
        let lock = self.store.lock()?;
        self.store.load(&lock)
    }

    /// Forget the cached credential.
    pub fn logout(&self) -> Result<(), AuthError> {
        let lock = self.store.lock()?;
        self.store.clear(&lock)
    }

    /// Attempt exactly one refresh. On failure the stale credential is cleared.
    async fn refresh_locked(
        &self,
        lock: &CacheLock,
        credential: &Credential,
    ) -> Result<Credential, AuthError> {
        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            return Err(AuthError::AuthExpired);
        };

        match self.provider.exchange(refresh_token).await {
            Ok(fresh) => {
                self.store.save(lock, &fresh)?;
                debug!("Credential refreshed, expires at {:?}", fresh.expires_at);
                Ok(fresh)
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                self.store.clear(lock)?;
                Err(AuthError::AuthExpired)
            }
        }
    }
}

#[async_trait]
impl<P: IdentityProvider> TokenSource for AuthManager<P> {
    async fn valid_token(&self) -> Result<Credential, AuthError> {
        self.get_valid_token().await
    }

    async fn refreshed_token(&self) -> Result<Credential, AuthError> {
        self.force_refresh().await
    }
}
