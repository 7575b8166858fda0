//! Integration tests for GitInspector against real repositories.

mod common;

use common::TestRepo;
use git_autocommit::commit::bound;
use git_autocommit::error::GitError;
use git_autocommit::git::{GitInspector, GitOps};

fn inspector(repo: &TestRepo) -> GitInspector {
    GitInspector::discover(repo.path()).expect("Failed to discover test repo")
}

#[test]
fn test_clean_repository_has_nothing_staged() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    let git = inspector(&repo);

    assert!(!git.has_staged_changes().unwrap());
    assert!(!git.has_unstaged_changes().unwrap());
    assert!(matches!(git.staged_diff(), Err(GitError::NoStagedChanges)));
}

#[test]
fn test_staged_file_shows_in_diff() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.write_file("src/login.rs", "pub fn login() {}\n");
    repo.stage("src/login.rs");
    let git = inspector(&repo);

    assert!(git.has_staged_changes().unwrap());
    let diff = git.staged_diff().unwrap();
    assert!(diff.contains("diff --git a/src/login.rs b/src/login.rs"));
    assert!(diff.contains("+pub fn login() {}"));
    assert!(git.status_summary().unwrap().contains("src/login.rs"));
}

#[test]
fn test_untracked_and_modified_files_are_unstaged() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.write_file("notes.txt", "untracked\n");
    let git = inspector(&repo);

    assert!(git.has_unstaged_changes().unwrap());
    assert!(!git.has_staged_changes().unwrap());

    repo.write_file("README.md", "hello again\n");
    assert!(git.has_unstaged_changes().unwrap());
}

#[test]
fn test_stage_all_stages_modified_and_untracked() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.write_file("README.md", "changed\n");
    repo.write_file("new.txt", "brand new\n");
    let git = inspector(&repo);

    git.stage_all().unwrap();

    assert!(git.has_staged_changes().unwrap());
    assert!(!git.has_unstaged_changes().unwrap());
    let diff = git.staged_diff().unwrap();
    assert!(diff.contains("README.md"));
    assert!(diff.contains("new.txt"));
}

#[test]
fn test_stage_tracked_leaves_untracked_files_alone() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.write_file("README.md", "changed\n");
    repo.write_file("scratch.txt", "not for this commit\n");
    let git = inspector(&repo);

    assert!(git.has_untracked_files().unwrap());
    git.stage_tracked().unwrap();

    let diff = git.staged_diff().unwrap();
    assert!(diff.contains("README.md"));
    assert!(!diff.contains("scratch.txt"));
    assert!(git.has_untracked_files().unwrap());
}

#[test]
fn test_modified_tracked_file_is_not_untracked() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.write_file("README.md", "changed\n");
    let git = inspector(&repo);

    assert!(git.has_unstaged_changes().unwrap());
    assert!(!git.has_untracked_files().unwrap());
}

#[test]
fn test_staged_diff_ignores_mnemonic_prefix_config() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.repo
        .config()
        .unwrap()
        .set_bool("diff.mnemonicPrefix", true)
        .unwrap();
    repo.write_file("src/x.rs", "pub fn x() {}\n");
    repo.stage("src/x.rs");
    let git = inspector(&repo);

    let diff = git.staged_diff().unwrap();
    assert!(diff.contains("diff --git a/src/x.rs b/src/x.rs"));

    let bounded = bound(&diff, 10_000);
    assert_eq!(bounded.chunks[0].file_path, "src/x.rs");
}

#[cfg(unix)]
#[test]
fn test_rejecting_hook_reports_commit_failure_not_broken_pipe() {
    use std::os::unix::fs::PermissionsExt;

    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.write_file("src/lib.rs", "pub fn add() {}\n");
    repo.stage("src/lib.rs");

    let hook = repo.repo.path().join("hooks").join("pre-commit");
    std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
    std::fs::write(&hook, "#!/bin/sh\necho 'lint failed' >&2\nexit 3\n").unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

    // Larger than a pipe buffer, so git exits before the message is consumed.
    let body = "x".repeat(1 << 20);
    let message = format!("feat: add addition\n\n{}", body);

    let git = inspector(&repo);
    match git.commit(&message) {
        Err(GitError::CommitFailed { code, stderr }) => {
            assert_ne!(code, 0);
            assert!(stderr.contains("lint failed"));
        }
        other => panic!("expected CommitFailed, got {:?}", other),
    }
    assert_eq!(repo.commit_count(), 1);
}

#[test]
fn test_commit_uses_exact_message() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    repo.write_file("src/lib.rs", "pub fn add() {}\n");
    repo.stage("src/lib.rs");
    let git = inspector(&repo);

    let message = "feat(math): add addition\n\nCallers needed a shared helper.";
    git.commit(message).unwrap();

    assert_eq!(repo.commit_count(), 2);
    assert_eq!(repo.head_message().unwrap().trim_end(), message);
    assert!(!git.has_staged_changes().unwrap());
}

#[test]
fn test_commit_in_new_repository() {
    let repo = TestRepo::new();
    repo.write_file("main.rs", "fn main() {}\n");
    repo.stage("main.rs");
    let git = inspector(&repo);

    assert!(git.has_staged_changes().unwrap());
    git.commit("feat: initial program").unwrap();
    assert_eq!(repo.commit_count(), 1);
}

#[test]
fn test_commit_failure_reports_exit_code() {
    let repo = TestRepo::new();
    repo.commit_file("README.md", "hello\n", "chore: initial commit");
    let git = inspector(&repo);

    // Nothing staged, so git refuses to commit.
    let result = git.commit("fix: nothing");
    match result {
        Err(GitError::CommitFailed { code, stderr }) => {
            assert_ne!(code, 0);
            assert!(!stderr.is_empty());
        }
        other => panic!("expected CommitFailed, got {:?}", other),
    }
}

#[test]
fn test_discover_from_subdirectory() {
    let repo = TestRepo::new();
    repo.write_file("nested/deep/file.txt", "x\n");
    let git = GitInspector::discover(repo.path().join("nested/deep")).unwrap();

    assert_eq!(
        git.workdir().canonicalize().unwrap(),
        repo.path().canonicalize().unwrap()
    );
}

#[test]
fn test_discover_outside_repository() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        GitInspector::discover(dir.path()),
        Err(GitError::NotAGitRepository)
    ));
}
