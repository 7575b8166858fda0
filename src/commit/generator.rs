//! Turning bounded diff chunks into a commit draft.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::commit::budget::DiffChunk;
use crate::commit::message::CommitDraft;
use crate::commit::prompt::build_user_content;
use crate::completion::Completer;
use crate::error::CompletionError;
use crate::models::Model;

/// Produces a fresh draft for the staged changes.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate(
        &self,
        chunks: &[DiffChunk],
        status: &str,
        model: &Model,
    ) -> Result<CommitDraft, CompletionError>;
}

/// [`DraftGenerator`] backed by a completion service.
pub struct CommitMessageGenerator<C: Completer> {
    completer: C,
}

impl<C: Completer> CommitMessageGenerator<C> {
    pub fn new(completer: C) -> Self {
        Self { completer }
    }
}

#[async_trait]
impl<C: Completer> DraftGenerator for CommitMessageGenerator<C> {
    async fn generate(
        &self,
        chunks: &[DiffChunk],
        status: &str,
        model: &Model,
    ) -> Result<CommitDraft, CompletionError> {
        let user_content = build_user_content(chunks, status);
        debug!(
            "Commit prompt: {} files, {} chars",
            chunks.len(),
            user_content.len()
        );

        let completion = self.completer.complete(model, &user_content).await?;
        if completion.text.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }

        let draft = CommitDraft::parse(&completion.text);
        if draft.parse_warning {
            warn!("Generated message is not a conventional commit; using it as-is");
        }
        Ok(draft)
    }
}
