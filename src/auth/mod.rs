//! Device-flow authentication and the credential lifecycle.

pub mod credential;
pub mod device;
pub mod manager;
pub mod provider;

pub use credential::{CacheLock, Credential, CredentialStore};
pub use device::{AuthInstructions, DeviceCode, DeviceFlowDisplay, DeviceSession, PollOutcome};
pub use manager::{AuthManager, TokenSource};
pub use provider::{GitHubIdentityProvider, IdentityProvider};
