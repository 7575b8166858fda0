//! Staged/unstaged state, staged diff, staging and commit.
//!
//! Repository discovery uses git2; everything else shells out to the system
//! `git` binary, inheriting the user's config, hooks and signing setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use git2::Repository;
use tracing::debug;

use crate::error::GitError;

/// What the commit flow needs from a repository.
#[cfg_attr(test, mockall::automock)]
pub trait GitOps {
    /// Whether the index differs from HEAD.
    fn has_staged_changes(&self) -> Result<bool, GitError>;

    /// Whether there are modified tracked files or untracked files not yet staged.
    fn has_unstaged_changes(&self) -> Result<bool, GitError>;

    /// Whether any non-ignored file is untracked.
    fn has_untracked_files(&self) -> Result<bool, GitError>;

    /// Short porcelain status, used as prompt context.
    fn status_summary(&self) -> Result<String, GitError>;

    /// Unified diff of the index against HEAD.
    fn staged_diff(&self) -> Result<String, GitError>;

    /// Stage every modified, deleted and untracked (non-ignored) file.
    fn stage_all(&self) -> Result<(), GitError>;

    /// Stage modifications and deletions of tracked files only.
    fn stage_tracked(&self) -> Result<(), GitError>;

    /// Create a commit with exactly this message.
    fn commit(&self, message: &str) -> Result<(), GitError>;
}

/// [`GitOps`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitInspector {
    workdir: PathBuf,
}

impl GitInspector {
    /// Locate the repository containing `path`.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self, GitError> {
        if which::which("git").is_err() {
            return Err(GitError::GitNotInstalled);
        }

        let repo = Repository::discover(path.as_ref()).map_err(|e| {
            debug!("Repository discovery failed: {}", e);
            GitError::NotAGitRepository
        })?;
        let workdir = repo
            .workdir()
            .ok_or(GitError::NotAGitRepository)?
            .to_path_buf();

        debug!("Using repository at {}", workdir.display());
        Ok(Self { workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn porcelain(&self) -> Result<Vec<StatusEntry>, GitError> {
        let out = self.run_git(&["status", "--porcelain", "--untracked-files=all"], "status")?;
        Ok(out.lines().filter_map(StatusEntry::parse).collect())
    }

    /// Run a git command in the workdir and return its stdout.
    fn run_git(&self, args: &[&str], operation: &str) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|source| GitError::SpawnFailed {
                operation: operation.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("not a git repository") {
                return Err(GitError::NotAGitRepository);
            }
            return Err(GitError::CommandFailed {
                operation: operation.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl GitOps for GitInspector {
    fn has_staged_changes(&self) -> Result<bool, GitError> {
        Ok(self.porcelain()?.iter().any(StatusEntry::is_staged))
    }

    fn has_unstaged_changes(&self) -> Result<bool, GitError> {
        Ok(self.porcelain()?.iter().any(StatusEntry::is_unstaged))
    }

    fn has_untracked_files(&self) -> Result<bool, GitError> {
        Ok(self.porcelain()?.iter().any(StatusEntry::is_untracked))
    }

    fn status_summary(&self) -> Result<String, GitError> {
        Ok(self.run_git(&["status", "--porcelain"], "status")?.trim_end().to_string())
    }

    fn staged_diff(&self) -> Result<String, GitError> {
        let diff = self.run_git(
            &[
                "diff",
                "--staged",
                "--no-color",
                "--no-ext-diff",
                // Overrides diff.mnemonicPrefix and diff.noprefix.
                "--src-prefix=a/",
                "--dst-prefix=b/",
            ],
            "diff --staged",
        )?;
        if diff.trim().is_empty() {
            return Err(GitError::NoStagedChanges);
        }
        Ok(diff)
    }

    fn stage_all(&self) -> Result<(), GitError> {
        self.run_git(&["add", "-A"], "add")?;
        debug!("Staged all changes");
        Ok(())
    }

    fn stage_tracked(&self) -> Result<(), GitError> {
        self.run_git(&["add", "-u"], "add")?;
        debug!("Staged tracked changes");
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        let mut child = Command::new("git")
            .args(["commit", "-F", "-"])
            .current_dir(&self.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GitError::SpawnFailed {
                operation: "commit".to_string(),
                source,
            })?;

        // git may exit before reading the message (a failing pre-commit hook),
        // so its exit status takes precedence over a broken pipe.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(message.as_bytes()),
            None => Ok(()),
        };

        let output = child
            .wait_with_output()
            .map_err(|source| GitError::SpawnFailed {
                operation: "commit".to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Err(GitError::CommitFailed {
                code: output.status.code().unwrap_or(-1),
                // "nothing to commit" is reported on stdout
                stderr: if stderr.is_empty() { stdout } else { stderr },
            });
        }

        written.map_err(|source| GitError::SpawnFailed {
            operation: "commit".to_string(),
            source,
        })?;

        debug!("Commit created");
        Ok(())
    }
}

/// One line of `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StatusEntry {
    index: char,
    worktree: char,
}

impl StatusEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut chars = line.chars();
        let index = chars.next()?;
        let worktree = chars.next()?;
        Some(Self { index, worktree })
    }

    fn is_untracked(&self) -> bool {
        self.index == '?' && self.worktree == '?'
    }

    fn is_staged(&self) -> bool {
        !matches!(self.index, ' ' | '?' | '!')
    }

    fn is_unstaged(&self) -> bool {
        self.is_untracked() || !matches!(self.worktree, ' ' | '?' | '!')
    }
}
