use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use url::Url;

use ebi_core::BuildInfo;

use crate::server::ServerDetails;
use crate::{BuildInfoSource, StoreError};

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishedBuildInfo {
    build_info: BuildInfo,
}

/// Reads published build-info over the Artifactory REST API.
pub struct ArtifactoryClient {
    base_url: String,
    authorization: Option<String>,
    agent: ureq::Agent,
}

impl ArtifactoryClient {
    pub fn new(server: &ServerDetails) -> Self {
        let mut base_url = server.url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let authorization = if !server.access_token.is_empty() {
            Some(format!("Bearer {}", server.access_token))
        } else if !server.user.is_empty() {
            let credentials = STANDARD.encode(format!("{}:{}", server.user, server.password));
            Some(format!("Basic {credentials}"))
        } else {
            None
        };
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            base_url,
            authorization,
            agent,
        }
    }

    /// `<base>api/build/<name>/<number>[?project=<project>]`, path-escaped.
    fn build_url(&self, name: &str, number: &str, project: Option<&str>) -> Result<Url, StoreError> {
        let invalid = |source| StoreError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        };
        let mut url = Url::parse(&self.base_url).map_err(invalid)?;
        url.path_segments_mut()
            .map_err(|()| invalid(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["api", "build", name, number]);
        if let Some(project) = project.filter(|p| !p.is_empty()) {
            url.query_pairs_mut().append_pair("project", project);
        }
        Ok(url)
    }
}

impl BuildInfoSource for ArtifactoryClient {
    fn build_info(
        &self,
        name: &str,
        number: &str,
        project: Option<&str>,
    ) -> Result<Option<BuildInfo>, StoreError> {
        let url = self.build_url(name, number, project)?;
        tracing::debug!(%url, "fetching build info");

        let http = |source: ureq::Error| StoreError::Http {
            url: url.to_string(),
            source,
        };
        let mut request = self.agent.get(url.as_str()).header("Accept", "application/json");
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization);
        }
        let mut response = request.call().map_err(http)?;
        let status = response.status();
        let body = response.body_mut().read_to_string().map_err(http)?;

        if status.as_u16() == 404 {
            tracing::debug!(build = %name, number = %number, "build info not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let published: PublishedBuildInfo =
            serde_json::from_str(&body).map_err(|source| StoreError::Json {
                context: url.to_string(),
                source,
            })?;
        Ok(Some(published.build_info))
    }
}
