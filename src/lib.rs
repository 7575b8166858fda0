//! git-autocommit - A CLI tool that writes conventional commit messages for
//! staged changes using the GitHub Copilot chat API.
//!
//! # Overview
//!
//! git-autocommit signs in with a GitHub device flow, reads the staged diff,
//! bounds it to a token budget, asks a Copilot model for a conventional commit
//! message and lets the user accept, edit, regenerate or cancel it before
//! committing.

pub mod auth;
pub mod commit;
pub mod completion;
pub mod config;
pub mod error;
pub mod flow;
pub mod git;
pub mod http;
pub mod models;

// Re-export commonly used types
pub use auth::{AuthManager, Credential, CredentialStore, TokenSource};
pub use commit::{CommitDraft, DiffChunk, DraftStatus};
pub use config::{AppContext, Config};
pub use error::{AuthError, CompletionError, ConfigError, FlowError, GitError, ModelError};
pub use flow::{FlowOptions, FlowOutcome, InteractionController};
pub use git::{GitInspector, GitOps};
pub use models::{Model, ModelCatalog};
