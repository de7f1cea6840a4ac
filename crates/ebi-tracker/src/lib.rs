pub mod jira;

use ebi_core::{AffectedIssue, IssueTrackerConfig, TrackerKind};

pub use jira::JiraSearchResolver;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("request to {tracker} failed: {source}")]
    Http {
        tracker: &'static str,
        #[source]
        source: ureq::Error,
    },
    /// Non-success status; the body is kept verbatim for diagnosis.
    #[error("response from {tracker}: {status}.\n{body}")]
    Status {
        tracker: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid response from {tracker}: {source}")]
    Json {
        tracker: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Turns issue keys into issue records.
///
/// Implementations must return an empty list for empty input without
/// contacting the tracker.
pub trait IssueResolver {
    fn name(&self) -> &str;
    fn resolve(&self, keys: &[String]) -> Result<Vec<AffectedIssue>, TrackerError>;
}

/// The backend for the configured tracker.
pub fn resolver_for(config: &IssueTrackerConfig) -> Box<dyn IssueResolver> {
    match config.tracker() {
        TrackerKind::Jira => Box::new(JiraSearchResolver::new(config.details())),
    }
}
