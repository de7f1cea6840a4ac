pub mod artifactory;
pub mod partials;
pub mod server;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ebi_core::{BuildInfo, LATEST_BUILD_NUMBER};

pub use artifactory::ArtifactoryClient;
pub use partials::{BuildKey, GeneralDetails, PartialsStore};
pub use server::ServerDetails;

/// Overrides [`store_root`].
pub const HOME_ENV: &str = "EBI_HOME";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("build name and build number are required")]
    MissingBuildParams,
    #[error("server ID '{0}' does not exist")]
    UnknownServer(String),
    #[error("no default server is configured; pass a server ID or set EBI_SERVER_URL")]
    NoDefaultServer,
    #[error("invalid server URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("response from {url}: {status}.\n{body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to format timestamp: {0}")]
    Time(#[from] time::error::Format),
    #[error("failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Read access to published build-info records.
pub trait BuildInfoSource {
    /// `Ok(None)` when the build does not exist.
    fn build_info(
        &self,
        name: &str,
        number: &str,
        project: Option<&str>,
    ) -> Result<Option<BuildInfo>, StoreError>;

    fn latest_build_info(
        &self,
        name: &str,
        project: Option<&str>,
    ) -> Result<Option<BuildInfo>, StoreError> {
        self.build_info(name, LATEST_BUILD_NUMBER, project)
    }
}

/// Return the per-user store root: `$EBI_HOME`, else `<data dir>/ebi`
/// (falls back to `~/.ebi`).
pub fn store_root() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        PathBuf::from(home)
    } else if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("ebi")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".ebi")
    } else {
        PathBuf::from(".ebi-store")
    }
}

/// Atomic write: write to temp file in same dir, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no parent dir for {}", path.display()),
        )
    })?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
