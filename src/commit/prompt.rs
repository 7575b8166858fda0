//! Prompt construction for generated commit messages.

use crate::commit::budget::{
    ChunkContent, DiffChunk, estimate_units, omitted_marker, truncation_note,
};

/// Fixed instruction sent as the system message of every completion request.
pub const SYSTEM_INSTRUCTION: &str = "You are a git commit message generator. \
Generate one concise conventional commit message.

Use these conventional commit types:
- feat: new feature
- fix: bug fix
- docs: documentation changes
- style: formatting, missing semicolons, etc
- refactor: code restructuring
- test: adding tests
- chore: maintenance tasks

Format: type(scope): description
Optionally follow the subject with a blank line and a short body.

Keep the subject line under 50 characters.
Only return the commit message, nothing else.";

/// Build the user message from the status summary and bounded diff chunks.
///
/// Adds only fixed framing to its inputs: with `status` from
/// [`bound_status`](crate::commit::budget::bound_status) and `chunks` from
/// [`bound`](crate::commit::bound), the result stays within their combined
/// budgets plus [`framing_units`].
pub fn build_user_content(chunks: &[DiffChunk], status: &str) -> String {
    let mut diff = String::new();
    for chunk in chunks {
        match &chunk.content {
            ChunkContent::Full(text) => diff.push_str(&sanitize_diff(text)),
            ChunkContent::Truncated(text) => {
                diff.push_str(&sanitize_diff(text));
                if !diff.ends_with('\n') {
                    diff.push('\n');
                }
                diff.push_str(&truncation_note(&chunk.file_path));
            }
            ChunkContent::Omitted => {
                diff.push_str(&omitted_marker(chunk.change_kind, &chunk.file_path));
            }
        }
    }

    let status = sanitize_diff(status);
    format!(
        "Git status:\n```\n{}\n```\n\nGit diff --staged:\n```\n{}\n```\n\nGenerate a conventional commit message:",
        status.trim_end(),
        diff.trim_end()
    )
}

/// Units of the fixed text wrapped around the status and diff.
pub fn framing_units() -> usize {
    estimate_units(&build_user_content(&[], ""))
}

/// Strip terminal escape sequences and control characters, keeping newlines and tabs.
pub fn sanitize_diff(text: &str) -> String {
    remove_control_chars(&remove_ansi_escapes(text))
}

fn remove_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Remove CSI sequences (`ESC [ ... final-byte`) and lone two-byte escapes.
fn remove_ansi_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                for next in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&next) {
                        break;
                    }
                }
            }
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }

    out
}
