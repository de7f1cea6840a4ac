use std::path::{Path, PathBuf};

use ebi_core::{AffectedIssue, IssueTrackerConfig, Issues, Tracker, VcsReference};
use ebi_store::{BuildInfoSource, BuildKey, PartialsStore};
use ebi_tracker::IssueResolver;
use ebi_vcs::{find_upstream_git, read_repository_reference, GitLogScanner};

use crate::collector::IssueCollector;
use crate::revision::RevisionLookup;
use crate::CollectError;

/// What issue collection talks to when a tracker is configured.
pub struct IssueCollection<'a> {
    pub config: &'a IssueTrackerConfig,
    pub store: &'a dyn BuildInfoSource,
    pub resolver: &'a dyn IssueResolver,
}

/// Result of one `collect-issues` run.
#[derive(Debug)]
pub struct CollectSummary {
    pub vcs: VcsReference,
    pub issues: Vec<AffectedIssue>,
    /// The partial build-info fragment that was written.
    pub partial: PathBuf,
}

/// Records the VCS reference of the working copy for a build and, with a
/// tracker configured, the issues it touched since the previous build.
pub struct CollectIssuesCommand<'a> {
    build: BuildKey,
    cwd: PathBuf,
    dot_git_path: Option<PathBuf>,
    partials: &'a PartialsStore,
    issues: Option<IssueCollection<'a>>,
}

impl<'a> CollectIssuesCommand<'a> {
    pub fn new(build: BuildKey, cwd: impl Into<PathBuf>, partials: &'a PartialsStore) -> Self {
        Self {
            build,
            cwd: cwd.into(),
            dot_git_path: None,
            partials,
            issues: None,
        }
    }

    /// Repository location; relative paths are taken from the working
    /// directory. Without one, `.git` is searched upwards from there.
    pub fn with_dot_git_path(mut self, path: Option<PathBuf>) -> Self {
        self.dot_git_path = path;
        self
    }

    pub fn with_issues(mut self, issues: IssueCollection<'a>) -> Self {
        self.issues = Some(issues);
        self
    }

    pub fn run(&self) -> Result<CollectSummary, CollectError> {
        tracing::info!("reading the git branch, revision and remote URL and adding them to the build info");
        self.partials.save_general_details(&self.build)?;

        let root = self.repo_root()?;
        let vcs = read_repository_reference(&root)?;
        tracing::debug!(root = %root.display(), url = %vcs.url, revision = %vcs.revision, branch = %vcs.branch, "working copy");

        let issues = match &self.issues {
            Some(collection) => self.collect_issues(collection, &root, &vcs)?,
            None => Vec::new(),
        };

        let partial = self.partials.save_partial(&self.build, |partial| {
            partial.vcs.push(vcs.clone());
            if let Some(collection) = &self.issues {
                partial.issues = Some(Issues {
                    tracker: Some(Tracker {
                        name: collection.config.tracker().name().to_string(),
                        version: String::new(),
                    }),
                    aggregate_build_issues: collection.config.aggregate(),
                    aggregation_build_status: collection.config.aggregation_status().to_string(),
                    affected_issues: issues.clone(),
                });
            }
        })?;

        tracing::info!(
            "Collected {} issue details for {}/{}.",
            issues.len(),
            self.build.name,
            self.build.number
        );
        Ok(CollectSummary {
            vcs,
            issues,
            partial,
        })
    }

    fn repo_root(&self) -> Result<PathBuf, CollectError> {
        let Some(path) = &self.dot_git_path else {
            return Ok(find_upstream_git(&self.cwd)?);
        };
        let path = self.cwd.join(path);
        // Accept the `.git` directory itself as well as the directory holding it.
        if path.file_name().is_some_and(|name| name == ".git") {
            if let Some(parent) = path.parent() {
                return Ok(parent.to_path_buf());
            }
        }
        Ok(path)
    }

    fn collect_issues(
        &self,
        collection: &IssueCollection<'_>,
        root: &Path,
        vcs: &VcsReference,
    ) -> Result<Vec<AffectedIssue>, CollectError> {
        let config = collection.config;
        let scanner = GitLogScanner::new(root, config.key_pattern().clone());
        scanner.verify_available()?;

        let revisions = RevisionLookup::new(collection.store, &self.build.name, self.build.project());
        IssueCollector::new(
            revisions,
            &scanner,
            config.extractor(),
            collection.resolver,
            config.log_limit(),
        )
        .collect(vcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::process::Command;

    use ebi_core::BuildInfo;
    use ebi_store::StoreError;
    use ebi_tracker::TrackerError;
    use ebi_vcs::VcsError;

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(["-c", "user.name=Test", "-c", "user.email=test@test.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    fn init_repo(dir: &Path, messages: &[&str]) -> Vec<String> {
        git(dir, &["init", "-q"]);
        git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(dir, &["remote", "add", "origin", "git@github.com:org/repo.git"]);
        messages
            .iter()
            .map(|msg| {
                git(dir, &["commit", "-q", "--allow-empty", "-m", msg]);
                git(dir, &["rev-parse", "HEAD"])
            })
            .collect()
    }

    struct PreviousBuild(Option<String>);

    impl BuildInfoSource for PreviousBuild {
        fn build_info(
            &self,
            _name: &str,
            _number: &str,
            _project: Option<&str>,
        ) -> Result<Option<BuildInfo>, StoreError> {
            Ok(self.0.clone().map(|revision| BuildInfo {
                vcs_list: vec![VcsReference {
                    url: "https://github.com/org/repo.git".into(),
                    revision,
                    ..Default::default()
                }],
                ..Default::default()
            }))
        }
    }

    #[derive(Default)]
    struct EchoResolver {
        calls: Cell<usize>,
    }

    impl IssueResolver for EchoResolver {
        fn name(&self) -> &str {
            "JIRA"
        }

        fn resolve(&self, keys: &[String]) -> Result<Vec<AffectedIssue>, TrackerError> {
            self.calls.set(self.calls.get() + 1);
            Ok(keys
                .iter()
                .map(|key| AffectedIssue {
                    key: key.clone(),
                    summary: String::new(),
                    url: format!("https://jira.example.com/browse/{key}"),
                    aggregated: false,
                })
                .collect())
        }
    }

    fn jira_config() -> IssueTrackerConfig {
        IssueTrackerConfig::builder("jira")
            .with_details("https://jira.example.com", "bot", "token")
            .with_aggregate(true, "Released")
            .build()
            .unwrap()
    }

    fn build() -> BuildKey {
        BuildKey::new("app", "7", None).unwrap()
    }

    #[test]
    fn records_vcs_and_issues_since_previous_build() {
        let repo = tempfile::tempdir().unwrap();
        let revs = init_repo(repo.path(), &["PROJ-1 old", "PROJ-2 new", "PROJ-3 newer"]);
        let store_dir = tempfile::tempdir().unwrap();
        let partials = PartialsStore::new(store_dir.path());
        let config = jira_config();
        let previous = PreviousBuild(Some(revs[0].clone()));
        let resolver = EchoResolver::default();

        let summary = CollectIssuesCommand::new(build(), repo.path(), &partials)
            .with_issues(IssueCollection {
                config: &config,
                store: &previous,
                resolver: &resolver,
            })
            .run()
            .unwrap();

        let keys: Vec<_> = summary.issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["PROJ-3", "PROJ-2"]);
        assert_eq!(resolver.calls.get(), 1);
        assert_eq!(summary.vcs.revision, revs[2]);
        assert_eq!(summary.vcs.branch, "main");

        let stored = partials.load_partials(&build()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].vcs, [summary.vcs.clone()]);
        let issues = stored[0].issues.as_ref().unwrap();
        assert_eq!(issues.tracker.as_ref().unwrap().name, "JIRA");
        assert!(issues.aggregate_build_issues);
        assert_eq!(issues.aggregation_build_status, "Released");
        assert_eq!(issues.affected_issues, summary.issues);
        assert!(partials.load_general_details(&build()).unwrap().is_some());
    }

    #[test]
    fn unknown_previous_revision_uses_latest_commit() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path(), &["PROJ-1 old", "PROJ-2 new"]);
        let store_dir = tempfile::tempdir().unwrap();
        let partials = PartialsStore::new(store_dir.path());
        let config = jira_config();
        let previous = PreviousBuild(Some("deadbeef".repeat(5)));
        let resolver = EchoResolver::default();

        let summary = CollectIssuesCommand::new(build(), repo.path(), &partials)
            .with_issues(IssueCollection {
                config: &config,
                store: &previous,
                resolver: &resolver,
            })
            .run()
            .unwrap();

        let keys: Vec<_> = summary.issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, ["PROJ-2"]);
    }

    #[test]
    fn without_tracker_only_vcs_is_recorded() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path(), &["PROJ-1 change"]);
        let nested = repo.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let partials = PartialsStore::new(store_dir.path());

        let summary = CollectIssuesCommand::new(build(), &nested, &partials)
            .run()
            .unwrap();

        assert!(summary.issues.is_empty());
        assert_eq!(summary.vcs.url, "git@github.com:org/repo.git");
        let stored = partials.load_partials(&build()).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].issues.is_none());
    }

    #[test]
    fn explicit_dot_git_path() {
        let repo = tempfile::tempdir().unwrap();
        let revs = init_repo(repo.path(), &["first"]);
        let elsewhere = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let partials = PartialsStore::new(store_dir.path());

        for path in [repo.path().to_path_buf(), repo.path().join(".git")] {
            let summary = CollectIssuesCommand::new(build(), elsewhere.path(), &partials)
                .with_dot_git_path(Some(path))
                .run()
                .unwrap();
            assert_eq!(summary.vcs.revision, revs[0]);
        }
    }

    #[test]
    fn no_repository_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let partials = PartialsStore::new(store_dir.path());

        let err = CollectIssuesCommand::new(build(), dir.path(), &partials)
            .with_dot_git_path(Some(dir.path().to_path_buf()))
            .run()
            .unwrap_err();
        assert!(matches!(err, CollectError::Vcs(VcsError::RepositoryNotFound(_))));
    }
}
