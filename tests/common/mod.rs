//! Shared test utilities for integration tests.
//!
//! Not all functions are used by every test file, but they're shared across tests.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use git2::{Oid, Repository, Signature};

use git_autocommit::auth::{Credential, TokenSource};
use git_autocommit::config::RetryPolicy;
use git_autocommit::error::AuthError;
use git_autocommit::models::Model;

/// A test git repository builder for integration tests.
pub struct TestRepo {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl TestRepo {
    /// Create a new empty git repository with a committer identity configured.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let repo = Repository::init(dir.path()).expect("Failed to init git repo");
        {
            let mut config = repo.config().expect("Failed to open repo config");
            config.set_str("user.name", "Test User").expect("Failed to set user.name");
            config
                .set_str("user.email", "test@example.com")
                .expect("Failed to set user.email");
            config
                .set_bool("commit.gpgsign", false)
                .expect("Failed to disable signing");
        }
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get the test signature for commits.
    fn signature(&self) -> Signature<'_> {
        Signature::now("Test User", "test@example.com").expect("Failed to create signature")
    }

    /// Write a file relative to the repository root.
    pub fn write_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(path, content).expect("Failed to write test file");
    }

    /// Add a file to the index.
    pub fn stage(&self, name: &str) {
        let mut index = self.repo.index().expect("Failed to get index");
        index.add_path(Path::new(name)).expect("Failed to add file");
        index.write().expect("Failed to write index");
    }

    /// Write, stage and commit a file. Returns the commit OID.
    pub fn commit_file(&self, name: &str, content: &str, message: &str) -> Oid {
        self.write_file(name, content);
        self.stage(name);

        let sig = self.signature();
        let mut index = self.repo.index().expect("Failed to get index");
        let tree_id = index.write_tree().expect("Failed to write tree");
        let tree = self.repo.find_tree(tree_id).expect("Failed to find tree");
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    /// Message of the commit HEAD points at, if any.
    pub fn head_message(&self) -> Option<String> {
        let head = self.repo.head().ok()?.peel_to_commit().ok()?;
        head.message().map(String::from)
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> usize {
        let Ok(mut walk) = self.repo.revwalk() else {
            return 0;
        };
        if walk.push_head().is_err() {
            return 0;
        }
        walk.count()
    }
}

/// A credential valid for the next hour.
pub fn live_credential(token: &str) -> Credential {
    Credential {
        access_token: token.to_string(),
        token_type: "bearer".to_string(),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        refresh_token: Some("gho_refresh".to_string()),
        scope: "read:user".to_string(),
    }
}

/// Token source handing out a fixed token, and a second one after refresh.
pub struct StaticTokens {
    pub token: String,
    pub refreshed: String,
    refreshes: Mutex<u32>,
}

impl StaticTokens {
    pub fn new(token: &str, refreshed: &str) -> Self {
        Self {
            token: token.to_string(),
            refreshed: refreshed.to_string(),
            refreshes: Mutex::new(0),
        }
    }

    pub fn refreshes(&self) -> u32 {
        *self.refreshes.lock().unwrap()
    }
}

#[async_trait]
impl TokenSource for StaticTokens {
    async fn valid_token(&self) -> Result<Credential, AuthError> {
        Ok(live_credential(&self.token))
    }

    async fn refreshed_token(&self) -> Result<Credential, AuthError> {
        *self.refreshes.lock().unwrap() += 1;
        Ok(live_credential(&self.refreshed))
    }
}

/// Retry policy with millisecond waits for tests against a mock server.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(20),
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("Failed to build HTTP client")
}

pub fn chat_model(id: &str) -> Model {
    Model {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        vendor: "Test".to_string(),
        version: None,
        family: None,
        max_output_tokens: None,
        capabilities: BTreeSet::from(["chat".to_string()]),
    }
}

/// A `/models` listing body in the Copilot shape.
pub fn models_body(ids: &[(&str, &str)]) -> serde_json::Value {
    let data: Vec<_> = ids
        .iter()
        .map(|(id, kind)| {
            serde_json::json!({
                "id": id,
                "name": id.to_uppercase(),
                "vendor": "Test",
                "version": format!("{}-2025", id),
                "capabilities": {
                    "family": id,
                    "type": kind,
                    "limits": {"max_output_tokens": 4096},
                    "supports": {"streaming": true}
                }
            })
        })
        .collect();
    serde_json::json!({ "data": data })
}

/// A `/chat/completions` body with one choice.
pub fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": "gpt-4o-2024-11-20",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}]
    })
}
