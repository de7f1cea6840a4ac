pub mod collector;
pub mod command;
pub mod revision;

use ebi_core::{ConfigError, ExtractError};
use ebi_store::StoreError;
use ebi_tracker::TrackerError;
use ebi_vcs::VcsError;

pub use collector::IssueCollector;
pub use command::{CollectIssuesCommand, CollectSummary, IssueCollection};
pub use revision::RevisionLookup;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
