use ebi_core::vcs_url::{to_https, to_ssh};
use ebi_store::{BuildInfoSource, StoreError};

/// Finds the revision the previous published build of a repository ended at.
pub struct RevisionLookup<'a> {
    store: &'a dyn BuildInfoSource,
    build_name: &'a str,
    project: Option<&'a str>,
}

impl<'a> RevisionLookup<'a> {
    pub fn new(store: &'a dyn BuildInfoSource, build_name: &'a str, project: Option<&'a str>) -> Self {
        Self {
            store,
            build_name,
            project,
        }
    }

    /// `None` when there is no previous build, no entry for `repo_url` in it,
    /// or the entry carries no revision.
    pub fn find_last_revision(&self, repo_url: &str) -> Result<Option<String>, StoreError> {
        if repo_url.is_empty() {
            return Ok(None);
        }
        let Some(info) = self.store.latest_build_info(self.build_name, self.project)? else {
            tracing::debug!(build = %self.build_name, "no previous build info");
            return Ok(None);
        };

        let (ssh, https) = (to_ssh(repo_url), to_https(repo_url));
        let revision = info
            .find_vcs(&[ssh.as_str(), https.as_str()])
            .map(|vcs| vcs.revision.clone())
            .filter(|rev| !rev.is_empty());
        tracing::debug!(build = %self.build_name, number = %info.number, ?revision, "last build revision");
        Ok(revision)
    }
}
