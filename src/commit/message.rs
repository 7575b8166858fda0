//! Commit drafts and conventional-commit parsing of model replies.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;
use tracing::debug;

/// Type given to replies that do not follow the conventional-commit grammar.
pub const FALLBACK_TYPE: &str = "chore";

// type(scope)!: description
static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)(?:\(([^()]+)\))?(!)?\s*:\s*(\S.*)$")
        .expect("conventional commit pattern is valid")
});

/// Where a draft is in the review cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DraftStatus {
    #[default]
    Pending,
    Accepted,
    Editing,
    Cancelled,
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftStatus::Pending => write!(f, "pending"),
            DraftStatus::Accepted => write!(f, "accepted"),
            DraftStatus::Editing => write!(f, "editing"),
            DraftStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A candidate commit message under review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDraft {
    pub commit_type: String,
    pub scope: Option<String>,
    pub description: String,
    pub body: Option<String>,
    /// `!` after the type/scope.
    pub breaking: bool,
    /// The text that will be committed.
    pub raw_text: String,
    pub status: DraftStatus,
    /// The text did not match `type(scope)?: description`.
    pub parse_warning: bool,
}

impl CommitDraft {
    /// Parse a model reply into a pending draft.
    ///
    /// Never fails: text outside the grammar keeps its content as the
    /// description, with type `chore` and `parse_warning` set.
    pub fn parse(reply: &str) -> Self {
        let text = strip_code_fence(reply);
        let mut draft = Self {
            commit_type: FALLBACK_TYPE.to_string(),
            scope: None,
            description: text.clone(),
            body: None,
            breaking: false,
            raw_text: text,
            status: DraftStatus::Pending,
            parse_warning: true,
        };
        draft.reparse();
        draft
    }

    /// Replace the text with the user's edit. The draft stays under review.
    pub fn apply_edit(&mut self, text: &str) {
        self.raw_text = text.trim().to_string();
        self.description = self.raw_text.clone();
        self.scope = None;
        self.body = None;
        self.breaking = false;
        self.commit_type = FALLBACK_TYPE.to_string();
        self.parse_warning = true;
        self.reparse();
        self.status = DraftStatus::Editing;
    }

    pub fn accept(&mut self) {
        self.status = DraftStatus::Accepted;
    }

    pub fn cancel(&mut self) {
        self.status = DraftStatus::Cancelled;
    }

    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.raw_text.lines().next().unwrap_or("")
    }

    /// The message handed to `git commit`.
    pub fn message(&self) -> &str {
        &self.raw_text
    }

    fn reparse(&mut self) {
        let mut lines = self.raw_text.lines();
        let first = lines.next().unwrap_or("").trim();

        let Some(caps) = SUBJECT_RE.captures(first) else {
            debug!("Reply is not a conventional commit: {:?}", first);
            return;
        };

        self.commit_type = caps[1].to_lowercase();
        self.scope = caps.get(2).map(|m| m.as_str().trim().to_string());
        self.breaking = caps.get(3).is_some();
        self.description = caps[4].trim().to_string();

        let body = lines.collect::<Vec<_>>().join("\n");
        let body = body.trim();
        self.body = (!body.is_empty()).then(|| body.to_string());
        self.parse_warning = false;
    }
}

/// Remove a surrounding markdown code fence, if the whole reply is fenced.
fn strip_code_fence(reply: &str) -> String {
    let trimmed = reply.trim();
    if let Some(rest) = trimmed.strip_prefix("```")
        && let Some(inner) = rest.strip_suffix("```")
    {
        // Drop an info string such as ```text
        let inner = match inner.split_once('\n') {
            Some((info, body)) if !info.trim().contains(' ') => body,
            _ => inner,
        };
        return inner.trim().to_string();
    }
    trimmed.to_string()
}
