use ebi_core::{dedup_keys, AffectedIssue, IssueKeyExtractor, VcsReference};
use ebi_tracker::IssueResolver;
use ebi_vcs::{LogSource, ScanOutcome, ScanRange};

use crate::revision::RevisionLookup;
use crate::CollectError;

/// Collects the issues a build touched since the previous published build.
///
/// The scan first covers `last revision..HEAD` (capped at `log_limit`
/// commits). If git rejects the last revision, the newest commit alone is
/// scanned instead; if that is rejected too, no issues are collected.
pub struct IssueCollector<'a> {
    revisions: RevisionLookup<'a>,
    scanner: &'a dyn LogSource,
    extractor: IssueKeyExtractor,
    resolver: &'a dyn IssueResolver,
    log_limit: usize,
}

impl<'a> IssueCollector<'a> {
    pub fn new(
        revisions: RevisionLookup<'a>,
        scanner: &'a dyn LogSource,
        extractor: IssueKeyExtractor,
        resolver: &'a dyn IssueResolver,
        log_limit: usize,
    ) -> Self {
        Self {
            revisions,
            scanner,
            extractor,
            resolver,
            log_limit,
        }
    }

    pub fn collect(&self, repo: &VcsReference) -> Result<Vec<AffectedIssue>, CollectError> {
        let last_revision = self.revisions.find_last_revision(&repo.url)?;
        let Some(lines) = self.scan(last_revision)? else {
            return Ok(Vec::new());
        };

        let keys = self.issue_keys(&lines, repo)?;
        if keys.is_empty() {
            tracing::info!("no issue keys found in the git log, branch or commit message");
            return Ok(Vec::new());
        }
        tracing::debug!(?keys, tracker = %self.resolver.name(), "resolving issue keys");
        Ok(self.resolver.resolve(&keys)?)
    }

    /// Matching log lines, or `None` when git rejected every range tried.
    fn scan(&self, last_revision: Option<String>) -> Result<Option<Vec<String>>, CollectError> {
        let bounded = ScanRange::new(last_revision, self.log_limit);
        if let ScanOutcome::Matched(lines) = self.scanner.scan(&bounded)? {
            return Ok(Some(lines));
        }

        let Some(revision) = bounded.since_exclusive else {
            tracing::info!("git log rejected the revision range; no new issues are added");
            return Ok(None);
        };
        tracing::info!(
            "revision '{revision}' from the latest build info is not in the git revision range; \
             collecting issues from the latest commit only"
        );
        match self.scanner.scan(&ScanRange::tip())? {
            ScanOutcome::Matched(lines) => Ok(Some(lines)),
            ScanOutcome::RevisionNotInRange => {
                tracing::info!("git log rejected the latest commit range; no new issues are added");
                Ok(None)
            }
        }
    }

    /// Keys from log lines, then the branch name, then the commit message.
    fn issue_keys(&self, lines: &[String], repo: &VcsReference) -> Result<Vec<String>, CollectError> {
        let mut keys = self.extractor.extract_lines(lines)?;
        keys.extend(self.extractor.extract(&repo.branch)?);
        keys.extend(self.extractor.extract(&repo.message)?);
        Ok(dedup_keys(keys))
    }
}
