//! User interaction during review.

use dialoguer::{Confirm, Editor, Select};

use crate::commit::CommitDraft;
use crate::error::FlowError;

/// What the user wants to do with the current draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Accept,
    /// Replace the draft with this text.
    Edit(String),
    Regenerate,
    Cancel,
}

/// Staging the user is asked to approve before generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageProposal {
    /// Nothing staged, only tracked files changed: `git add -u`.
    TrackedFiles,
    /// Nothing staged and untracked files exist: `git add -A`.
    AllFiles,
    /// Something staged, but untracked files exist too: `git add -A`.
    UntrackedToo,
}

impl StageProposal {
    pub fn question(self) -> &'static str {
        match self {
            StageProposal::TrackedFiles => {
                "No staged changes found. Stage modified files (git add -u)?"
            }
            StageProposal::AllFiles => {
                "No staged changes found, but there are untracked files. Add all files (git add -A)?"
            }
            StageProposal::UntrackedToo => "There are untracked files. Add them too (git add -A)?",
        }
    }
}

/// Asks the user about staging and drafts.
pub trait Prompter {
    fn review(&mut self, draft: &CommitDraft) -> Result<ReviewAction, FlowError>;

    /// Whether to stage as proposed. Declines unless overridden.
    fn confirm_stage(&mut self, _proposal: StageProposal) -> Result<bool, FlowError> {
        Ok(false)
    }

    /// Progress line shown while work happens in the background.
    fn progress(&mut self, _message: &str) {}
}

const CHOICES: [&str; 4] = ["Accept", "Edit", "Regenerate", "Cancel"];

/// Terminal prompter: select menu plus `$EDITOR` for edits.
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn review(&mut self, draft: &CommitDraft) -> Result<ReviewAction, FlowError> {
        println!("\nProposed commit message:\n");
        for line in draft.raw_text.lines() {
            println!("    {}", line);
        }
        println!();
        if draft.parse_warning {
            println!("Warning: this message does not follow the conventional commit format.\n");
        }

        loop {
            let choice = Select::new()
                .with_prompt("What would you like to do?")
                .items(&CHOICES)
                .default(0)
                .interact_opt()
                .map_err(|e| FlowError::Prompt(e.to_string()))?;

            let action = match choice {
                Some(0) => ReviewAction::Accept,
                Some(1) => {
                    let edited = Editor::new()
                        .edit(&draft.raw_text)
                        .map_err(|e| FlowError::Prompt(e.to_string()))?;
                    match edited {
                        Some(text) if !text.trim().is_empty() => ReviewAction::Edit(text),
                        _ => {
                            println!("Edit aborted, keeping the current message.");
                            continue;
                        }
                    }
                }
                Some(2) => ReviewAction::Regenerate,
                _ => ReviewAction::Cancel,
            };
            return Ok(action);
        }
    }

    fn confirm_stage(&mut self, proposal: StageProposal) -> Result<bool, FlowError> {
        let answer = Confirm::new()
            .with_prompt(proposal.question())
            .default(false)
            .interact_opt()
            .map_err(|e| FlowError::Prompt(e.to_string()))?;
        Ok(answer.unwrap_or(false))
    }

    fn progress(&mut self, message: &str) {
        eprintln!("{}", message);
    }
}
