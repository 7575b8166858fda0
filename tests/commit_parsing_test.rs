//! Integration tests for diff budgeting and draft parsing on realistic input.

use git_autocommit::commit::budget::estimate_units;
use git_autocommit::commit::{ChangeKind, ChunkContent, CommitDraft, bound};

/// A staged diff shaped like `git diff --staged` output for a small refactor.
fn realistic_diff() -> String {
    let mut diff = String::new();
    diff.push_str(
        "diff --git a/src/auth/session.rs b/src/auth/session.rs\n\
         index 3b18e51..a9c2f4d 100644\n\
         --- a/src/auth/session.rs\n\
         +++ b/src/auth/session.rs\n\
         @@ -10,7 +10,9 @@ impl Session {\n\
         -    pub fn touch(&mut self) {}\n\
         +    pub fn touch(&mut self) {\n\
         +        self.last_seen = Instant::now();\n\
         +    }\n",
    );
    diff.push_str(
        "diff --git a/src/auth/legacy.rs b/src/auth/legacy.rs\n\
         deleted file mode 100644\n\
         index 5d1f0e2..0000000\n\
         --- a/src/auth/legacy.rs\n\
         +++ /dev/null\n\
         @@ -1,3 +0,0 @@\n\
         -pub fn legacy() {}\n\
         -pub fn older() {}\n\
         -pub fn oldest() {}\n",
    );
    diff.push_str(
        "diff --git a/assets/logo.png b/assets/logo.png\n\
         new file mode 100644\n\
         index 0000000..e69de29\n\
         Binary files /dev/null and b/assets/logo.png differ\n",
    );
    diff.push_str("diff --git a/src/big.rs b/src/big.rs\nnew file mode 100644\nindex 0000000..1234567\n--- /dev/null\n+++ b/src/big.rs\n@@ -0,0 +1,400 @@\n");
    for i in 0..400 {
        diff.push_str(&format!("+pub const VALUE_{i}: usize = {i};\n"));
    }
    diff.push_str(
        "diff --git a/docs/old.md b/docs/new.md\n\
         similarity index 100%\n\
         rename from docs/old.md\n\
         rename to docs/new.md\n",
    );
    diff
}

#[test]
fn test_every_file_keeps_identity_and_order() {
    let bounded = bound(&realistic_diff(), 300);

    let files: Vec<(&str, ChangeKind)> = bounded
        .chunks
        .iter()
        .map(|c| (c.file_path.as_str(), c.change_kind))
        .collect();
    assert_eq!(
        files,
        vec![
            ("src/auth/session.rs", ChangeKind::Modified),
            ("src/auth/legacy.rs", ChangeKind::Deleted),
            ("assets/logo.png", ChangeKind::Binary),
            ("src/big.rs", ChangeKind::Added),
            ("docs/new.md", ChangeKind::Renamed),
        ]
    );
}

#[test]
fn test_budget_is_respected_across_sizes() {
    let diff = realistic_diff();
    let files = 5;
    // A zero budget reduces every file to its marker: the smallest possible output.
    let floor = bound(&diff, 0).total_units();
    for budget in [floor, floor + 20, 150, 300, 1_000, 5_000, 100_000] {
        let bounded = bound(&diff, budget);
        assert_eq!(bounded.chunks.len(), files, "budget {}", budget);
        assert!(
            bounded.total_units() <= budget,
            "budget {} produced {} units",
            budget,
            bounded.total_units()
        );
        assert!(!bounded.over_budget);
    }
}

#[test]
fn test_truncated_content_is_prefix_of_whole_lines() {
    let diff = realistic_diff();
    let bounded = bound(&diff, 400);

    let truncated = bounded
        .chunks
        .iter()
        .find(|c| c.is_truncated())
        .expect("the large file should be truncated");
    assert_eq!(truncated.file_path, "src/big.rs");

    let ChunkContent::Truncated(text) = &truncated.content else {
        unreachable!()
    };
    let start = diff.find("diff --git a/src/big.rs").unwrap();
    assert!(diff[start..].starts_with(text.as_str()));
    assert!(text.ends_with('\n'));
    assert!(estimate_units(text) > 0);

    // Everything after the truncated file is omitted.
    assert!(bounded.chunks.last().unwrap().is_omitted());
}

#[test]
fn test_large_budget_keeps_everything_but_binary() {
    let bounded = bound(&realistic_diff(), 100_000);
    for chunk in &bounded.chunks {
        match chunk.change_kind {
            ChangeKind::Binary => assert!(chunk.is_omitted()),
            _ => assert!(matches!(chunk.content, ChunkContent::Full(_))),
        }
    }
    assert!(!bounded.is_reduced());
}

#[test]
fn test_draft_from_subject_only() {
    let draft = CommitDraft::parse("feat: add login");
    assert_eq!(draft.commit_type, "feat");
    assert_eq!(draft.scope, None);
    assert_eq!(draft.description, "add login");
    assert!(!draft.parse_warning);
}

#[test]
fn test_draft_from_malformed_reply() {
    let draft = CommitDraft::parse("oops this is not conventional");
    assert_eq!(draft.commit_type, "chore");
    assert_eq!(draft.description, "oops this is not conventional");
    assert!(draft.parse_warning);
}

#[test]
fn test_draft_with_body_and_fence() {
    let reply = "```\nfix(session): refresh last-seen on activity\n\nSessions expired during active use.\n```";
    let draft = CommitDraft::parse(reply);

    assert_eq!(draft.commit_type, "fix");
    assert_eq!(draft.scope.as_deref(), Some("session"));
    assert_eq!(draft.body.as_deref(), Some("Sessions expired during active use."));
    assert_eq!(
        draft.message(),
        "fix(session): refresh last-seen on activity\n\nSessions expired during active use."
    );
}
