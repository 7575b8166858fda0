//! The commit run as an explicit state machine.
//!
//! ```text
//! Idle -> CheckingStage -> NoChanges                         (terminal, NoStagedChanges)
//!                       -> Staging -> Generating
//!                       -> Generating -> Reviewing
//! CheckingStage asks before staging unless auto-stage is on:
//!   nothing staged, tracked edits only   -> `add -u` on yes, NoChanges on no
//!   nothing staged, untracked files      -> `add -A` on yes, NoChanges on no
//!   something staged, untracked files    -> `add -A` on yes, Generating on no
//! Reviewing -> accept     -> Committing -> Done
//!           -> edit       -> Reviewing
//!           -> regenerate -> Generating
//!           -> cancel     -> Cancelled                       (terminal, no commit)
//! ```
//!
//! Failures while generating or committing end the run with the error.

use tracing::{debug, info};

use crate::commit::budget::{STATUS_SHARE_DIVISOR, bound_status, estimate_units};
use crate::commit::{CommitDraft, DiffChunk, DraftGenerator, bound};
use crate::error::{FlowError, GitError};
use crate::git::GitOps;
use crate::models::{Model, ModelResolver};

use super::prompter::{Prompter, ReviewAction, StageProposal};

/// Per-run choices from the command line and config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOptions {
    /// Stage every change before generating, without asking.
    pub auto_stage: bool,
    /// Model id or name; `None` uses the configured default.
    pub model: Option<String>,
    pub token_budget: usize,
}

/// How a run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Committed with this message.
    Committed(String),
    Cancelled,
}

#[derive(Debug)]
enum FlowState {
    Idle,
    CheckingStage,
    NoChanges,
    Staging(StageScope),
    Generating,
    Reviewing(CommitDraft),
    Committing(CommitDraft),
    Cancelled,
    Done(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageScope {
    Tracked,
    All,
}

/// Staged diff and status, collected once per run.
struct StagedContext {
    chunks: Vec<DiffChunk>,
    status: String,
}

/// Drives one commit cycle.
pub struct InteractionController<'a> {
    git: &'a dyn GitOps,
    generator: &'a dyn DraftGenerator,
    models: &'a dyn ModelResolver,
    prompter: &'a mut dyn Prompter,
    options: FlowOptions,
}

impl<'a> InteractionController<'a> {
    pub fn new(
        git: &'a dyn GitOps,
        generator: &'a dyn DraftGenerator,
        models: &'a dyn ModelResolver,
        prompter: &'a mut dyn Prompter,
        options: FlowOptions,
    ) -> Self {
        Self {
            git,
            generator,
            models,
            prompter,
            options,
        }
    }

    pub async fn run(mut self) -> Result<FlowOutcome, FlowError> {
        let mut state = FlowState::Idle;
        let mut staged: Option<StagedContext> = None;
        let mut model: Option<Model> = None;

        loop {
            debug!("Flow state: {:?}", state);
            state = match state {
                FlowState::Idle => FlowState::CheckingStage,

                FlowState::CheckingStage => self.check_stage()?,

                FlowState::NoChanges => return Err(GitError::NoStagedChanges.into()),

                FlowState::Staging(scope) => {
                    match scope {
                        StageScope::Tracked => self.git.stage_tracked()?,
                        StageScope::All => self.git.stage_all()?,
                    }
                    FlowState::Generating
                }

                FlowState::Generating => {
                    let ctx = match staged.take() {
                        Some(ctx) => ctx,
                        None => self.collect_staged()?,
                    };
                    let chosen = match model.take() {
                        Some(m) => m,
                        None => self.models.resolve_model(self.options.model.as_deref()).await?,
                    };

                    self.prompter.progress(&format!(
                        "Generating commit message with {}...",
                        chosen.display_name
                    ));
                    let draft = self.generator.generate(&ctx.chunks, &ctx.status, &chosen).await;

                    staged = Some(ctx);
                    model = Some(chosen);
                    FlowState::Reviewing(draft?)
                }

                FlowState::Reviewing(mut draft) => match self.prompter.review(&draft)? {
                    ReviewAction::Accept => {
                        draft.accept();
                        FlowState::Committing(draft)
                    }
                    ReviewAction::Edit(text) => {
                        if !text.trim().is_empty() {
                            draft.apply_edit(&text);
                        }
                        FlowState::Reviewing(draft)
                    }
                    ReviewAction::Regenerate => FlowState::Generating,
                    ReviewAction::Cancel => {
                        draft.cancel();
                        FlowState::Cancelled
                    }
                },

                FlowState::Committing(draft) => {
                    self.git.commit(draft.message())?;
                    info!("Committed: {}", draft.subject());
                    FlowState::Done(draft.raw_text)
                }

                FlowState::Cancelled => return Ok(FlowOutcome::Cancelled),

                FlowState::Done(message) => return Ok(FlowOutcome::Committed(message)),
            };
        }
    }

    fn check_stage(&mut self) -> Result<FlowState, FlowError> {
        if self.options.auto_stage && self.git.has_unstaged_changes()? {
            return Ok(FlowState::Staging(StageScope::All));
        }

        let staged = self.git.has_staged_changes()?;
        let untracked = !self.options.auto_stage && self.git.has_untracked_files()?;

        let (proposal, scope) = match (staged, untracked) {
            (true, false) => return Ok(FlowState::Generating),
            (true, true) => (StageProposal::UntrackedToo, StageScope::All),
            (false, true) => (StageProposal::AllFiles, StageScope::All),
            (false, false) => {
                if self.options.auto_stage || !self.git.has_unstaged_changes()? {
                    return Ok(FlowState::NoChanges);
                }
                (StageProposal::TrackedFiles, StageScope::Tracked)
            }
        };

        if self.prompter.confirm_stage(proposal)? {
            return Ok(FlowState::Staging(scope));
        }
        debug!("Staging declined: {:?}", proposal);
        Ok(if staged {
            FlowState::Generating
        } else {
            FlowState::NoChanges
        })
    }

    /// Staged diff and status, together charged against the token budget.
    fn collect_staged(&mut self) -> Result<StagedContext, FlowError> {
        let budget = self.options.token_budget;
        let diff = self.git.staged_diff()?;
        let status = bound_status(&self.git.status_summary()?, budget / STATUS_SHARE_DIVISOR);
        let bounded = bound(&diff, budget.saturating_sub(estimate_units(&status)));

        if bounded.is_reduced() {
            self.prompter.progress(&format!(
                "Diff exceeds the {} token budget; some files were truncated or summarized.",
                self.options.token_budget
            ));
        }
        debug!(
            "Bounded diff: {} files, {} units; status {} units",
            bounded.chunks.len(),
            bounded.total_units(),
            estimate_units(&status)
        );

        Ok(StagedContext {
            chunks: bounded.chunks,
            status,
        })
    }
}
