use std::ffi::OsString;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::exec::{run_capture, run_watched, CmdSpec, LineWatcher, StreamKind, WatchFlow};
use crate::VcsError;

/// What git prints when asked for `<rev>..` and `<rev>` is not in the history.
pub const REVISION_RANGE_ERROR: &str = r"fatal: Invalid revision range [a-fA-F0-9]+\.\.";

/// The commit window of one scan attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    /// Only commits after this revision; `None` scans from the tip backwards.
    pub since_exclusive: Option<String>,
    pub limit: usize,
}

impl ScanRange {
    pub fn new(since_exclusive: Option<String>, limit: usize) -> Self {
        Self {
            since_exclusive: since_exclusive.filter(|rev| !rev.is_empty()),
            limit,
        }
    }

    /// The newest commit only.
    pub fn tip() -> Self {
        Self::new(None, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Log lines that matched the key pattern, newest commit first.
    Matched(Vec<String>),
    /// The lower bound of the range is not part of the history.
    RevisionNotInRange,
}

/// Something that can list commit lines for a range.
pub trait LogSource {
    fn scan(&self, range: &ScanRange) -> Result<ScanOutcome, VcsError>;
}

/// Scans `git log` output of a working copy for lines carrying issue keys.
#[derive(Debug, Clone)]
pub struct GitLogScanner {
    repo_root: PathBuf,
    key_pattern: Regex,
    git: OsString,
}

impl GitLogScanner {
    pub fn new(repo_root: impl Into<PathBuf>, key_pattern: Regex) -> Self {
        Self {
            repo_root: repo_root.into(),
            key_pattern,
            git: OsString::from("git"),
        }
    }

    pub fn with_git(mut self, git: impl Into<OsString>) -> Self {
        self.git = git.into();
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Check that the git binary can be started at all.
    pub fn verify_available(&self) -> Result<(), VcsError> {
        run_capture(&CmdSpec::new(&self.git).arg("--version"))
            .map(|version| tracing::debug!(%version, "git found"))
            .map_err(|e| VcsError::GitUnavailable(e.to_string()))
    }

    fn log_cmd(&self, range: &ScanRange) -> CmdSpec {
        let mut cmd = CmdSpec::new(&self.git)
            .args(["log", "--pretty=format:%d%s"])
            .arg(format!("--max-count={}", range.limit))
            .current_dir(&self.repo_root);
        if let Some(rev) = &range.since_exclusive {
            cmd = cmd.arg(format!("{rev}.."));
        }
        cmd
    }
}

impl LogSource for GitLogScanner {
    fn scan(&self, range: &ScanRange) -> Result<ScanOutcome, VcsError> {
        let cmd = self.log_cmd(range);
        tracing::debug!(cmd = %cmd.display(), "fetching git log");

        let mut matched = Vec::new();
        let mut out_of_range = false;
        let outcome = {
            let mut watchers = [
                LineWatcher::new(
                    "issue-lines",
                    StreamKind::Stdout,
                    self.key_pattern.clone(),
                    |line| {
                        matched.push(line.to_string());
                        WatchFlow::Continue
                    },
                ),
                LineWatcher::new(
                    "revision-range",
                    StreamKind::Stderr,
                    Regex::new(REVISION_RANGE_ERROR)?,
                    |_| {
                        out_of_range = true;
                        WatchFlow::Stop
                    },
                ),
            ];
            run_watched(&cmd, &mut watchers)?
        };

        if out_of_range {
            return Ok(ScanOutcome::RevisionNotInRange);
        }
        if !outcome.status.success() {
            return Err(VcsError::CommandFailed {
                command: cmd.display(),
                status: outcome.status.to_string(),
                stderr: outcome.stderr_tail,
            });
        }
        tracing::debug!(lines = matched.len(), "log lines with issue keys");
        Ok(ScanOutcome::Matched(matched))
    }
}
