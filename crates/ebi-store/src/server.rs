use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::StoreError;

pub const SERVER_URL_ENV: &str = "EBI_SERVER_URL";
pub const SERVER_USER_ENV: &str = "EBI_SERVER_USER";
pub const SERVER_PASSWORD_ENV: &str = "EBI_SERVER_PASSWORD";
pub const SERVER_TOKEN_ENV: &str = "EBI_SERVER_TOKEN";

/// Connection details of one build-info server.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetails {
    #[serde(default)]
    pub server_id: String,
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub is_default: bool,
}

impl fmt::Debug for ServerDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "" } else { "***" };
        f.debug_struct("ServerDetails")
            .field("server_id", &self.server_id)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &mask(&self.password))
            .field("access_token", &mask(&self.access_token))
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// `<store_root>/servers.json`
pub fn servers_file(store_root: &Path) -> PathBuf {
    store_root.join("servers.json")
}

impl ServerDetails {
    /// Details taken purely from `EBI_SERVER_*` variables; `None` without a URL.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let var = |key: &str| lookup(key).unwrap_or_default();
        let url = var(SERVER_URL_ENV);
        if url.is_empty() {
            return None;
        }
        Some(Self {
            server_id: String::new(),
            url,
            user: var(SERVER_USER_ENV),
            password: var(SERVER_PASSWORD_ENV),
            access_token: var(SERVER_TOKEN_ENV),
            is_default: true,
        })
    }

    /// Resolve the server to talk to.
    ///
    /// An explicit `server_id` must exist in `servers_file`. Without one the
    /// environment wins, then the entry marked default, then a sole entry.
    pub fn load(
        server_id: Option<&str>,
        servers_file: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StoreError> {
        let server_id = server_id.filter(|id| !id.is_empty());
        if server_id.is_none() {
            if let Some(details) = Self::from_env(&lookup) {
                tracing::debug!(url = %details.url, "using server from environment");
                return Ok(details);
            }
        }

        let servers = read_servers(servers_file)?;
        let found = match server_id {
            Some(id) => servers
                .into_iter()
                .find(|s| s.server_id == id)
                .ok_or_else(|| StoreError::UnknownServer(id.to_string()))?,
            None => {
                let sole = servers.len() == 1;
                servers
                    .into_iter()
                    .find(|s| s.is_default || sole)
                    .ok_or(StoreError::NoDefaultServer)?
            }
        };
        tracing::debug!(server_id = %found.server_id, url = %found.url, "using configured server");
        Ok(found)
    }
}

fn read_servers(path: &Path) -> Result<Vec<ServerDetails>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| StoreError::Json {
        context: path.display().to_string(),
        source,
    })
}
