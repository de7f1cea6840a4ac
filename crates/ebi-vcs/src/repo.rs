use std::path::{Path, PathBuf};

use ebi_core::vcs_url::strip_credentials;
use ebi_core::VcsReference;

use crate::exec::{run_capture, CmdSpec};
use crate::VcsError;

/// Walk up from `start` to the first directory containing `.git`.
pub fn find_upstream_git(start: &Path) -> Result<PathBuf, VcsError> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| VcsError::RepositoryNotFound(start.to_path_buf()))
}

/// Read remote URL, HEAD revision, branch and last commit message of the
/// working copy at `root`.
pub fn read_repository_reference(root: &Path) -> Result<VcsReference, VcsError> {
    if !root.join(".git").exists() {
        return Err(VcsError::RepositoryNotFound(root.to_path_buf()));
    }
    let git = |args: &[&str]| run_capture(&CmdSpec::new("git").args(args).current_dir(root));

    // No origin remote is not an error: the build simply has no comparable URL.
    let url = match git(&["config", "--get", "remote.origin.url"]) {
        Ok(url) => strip_credentials(&url),
        Err(VcsError::CommandFailed { .. }) => {
            tracing::debug!(root = %root.display(), "no remote.origin.url configured");
            String::new()
        }
        Err(e) => return Err(e),
    };
    let revision = git(&["rev-parse", "HEAD"])?;
    let branch = match git(&["rev-parse", "--abbrev-ref", "HEAD"])?.as_str() {
        "HEAD" => String::new(),
        name => name.to_string(),
    };
    let message = git(&["log", "-1", "--pretty=%B"])?;

    Ok(VcsReference {
        url,
        revision,
        branch,
        message,
    })
}
