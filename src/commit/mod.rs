//! Commit message generation: diff budgeting, prompt, model reply parsing.

pub mod budget;
pub mod generator;
pub mod message;
pub mod prompt;

pub use budget::{BoundedDiff, ChangeKind, ChunkContent, DiffChunk, bound};
pub use generator::{CommitMessageGenerator, DraftGenerator};
pub use message::{CommitDraft, DraftStatus};
