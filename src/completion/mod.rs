//! Chat completion client for generating commit messages.

pub mod client;
pub mod retry;

pub use client::{Completer, Completion, CompletionClient};
