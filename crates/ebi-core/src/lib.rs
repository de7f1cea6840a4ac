pub mod config;
pub mod extract;
pub mod types;
pub mod vcs_url;

pub use config::{ConfigError, IssueTrackerConfig, IssueTrackerConfigBuilder, TrackerDetails, TrackerKind};
pub use extract::{dedup_keys, ExtractError, IssueKeyExtractor};
pub use types::{
    AffectedIssue, BuildInfo, Issues, Partial, Tracker, VcsReference, LATEST_BUILD_NUMBER,
};
