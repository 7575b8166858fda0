//! Interactive commit flow: check, stage, generate, review, commit.

pub mod controller;
pub mod prompter;

pub use controller::{FlowOptions, FlowOutcome, InteractionController};
pub use prompter::{DialoguerPrompter, Prompter, ReviewAction, StageProposal};
