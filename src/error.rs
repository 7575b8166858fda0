//! Error types for git-autocommit modules using thiserror.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from authentication and the credential cache.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated. Run `git-autocommit auth` to sign in with GitHub.")]
    NotAuthenticated,

    #[error("Authentication expired. Run `git-autocommit auth` to sign in again.")]
    AuthExpired,

    #[error("Access denied. The authorization request was declined.")]
    AuthDenied,

    #[error("Cached credential is invalid: {0}. Run `git-autocommit auth` to sign in again.")]
    InvalidCachedCredential(String),

    #[error("Authentication cancelled")]
    Cancelled,

    #[error("Identity provider returned {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("Identity provider error: {0}")]
    ProviderError(String),

    #[error("HTTP request to identity provider failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Failed to access credential cache {}: {source}", path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?} waiting for the credential cache lock held by another git-autocommit process")]
    LockTimeout(Duration),

    #[error("Failed to serialize credential: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository. Run git-autocommit from within a git repository.")]
    NotAGitRepository,

    #[error("git executable not found on PATH")]
    GitNotInstalled,

    #[error("No staged changes to commit. Stage files with `git add` or pass --all.")]
    NoStagedChanges,

    #[error("Failed to run git {operation}: {source}")]
    SpawnFailed {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {operation} exited with code {code}: {stderr}")]
    CommandFailed {
        operation: String,
        code: i32,
        stderr: String,
    },

    #[error("git commit exited with code {code}: {stderr}")]
    CommitFailed { code: i32, stderr: String },
}

/// Errors from the model catalog.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Unknown model '{0}'. Run `git-autocommit models` to list available models.")]
    UnknownModel(String),

    #[error("The account has no chat models available")]
    NoModelsAvailable,

    #[error("Model listing returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model listing request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Errors from the chat completion endpoint.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Rate limited by the completion service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Completion service rejected the token as expired")]
    AuthExpired,

    #[error("Model '{0}' is not supported by the completion service")]
    InvalidModel(String),

    #[error("Completion service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Completion request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Completion request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Completion service returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error("Completion service returned an empty message")]
    EmptyResponse,

    #[error("Completion failed after {attempts} attempt(s): {last}")]
    CompletionFailed {
        attempts: u32,
        #[source]
        last: Box<CompletionError>,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl CompletionError {
    /// Whether the failure is worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CompletionError::RateLimited { .. }
                | CompletionError::Server { .. }
                | CompletionError::Network(_)
        )
    }

    /// Minimum wait the service asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CompletionError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors from reading or editing the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the config directory. Set GIT_AUTOCOMMIT_HOME.")]
    NoConfigDir,

    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end a commit run.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Prompt failed: {0}")]
    Prompt(String),
}
