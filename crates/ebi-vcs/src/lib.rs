pub mod exec;
pub mod log_scan;
pub mod repo;

pub use exec::{run_capture, run_watched, CmdSpec, LineWatcher, RunOutcome, StreamKind, WatchFlow};
pub use log_scan::{GitLogScanner, LogSource, ScanOutcome, ScanRange};
pub use repo::{find_upstream_git, read_repository_reference};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("could not find .git in {} or any parent directory", .0.display())]
    RepositoryNotFound(PathBuf),
    #[error("git is not available: {0}")]
    GitUnavailable(String),
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
