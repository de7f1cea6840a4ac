use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use ebi_core::{AffectedIssue, TrackerDetails};

use crate::{IssueResolver, TrackerError};

const TRACKER: &str = "JIRA";
const SEARCH_PATH: &str = "rest/api/3/search";
const TIMEOUT: Duration = Duration::from_secs(30);
/// Single page only; keys beyond the first page are not fetched.
pub const MAX_RESULTS: u32 = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    jql: String,
    fields: [&'static str; 2],
    start_at: u32,
    max_results: u32,
    validate_query: &'static str,
}

impl SearchRequest {
    fn for_keys(keys: &[String]) -> Self {
        Self {
            jql: format!("issue IN ({})", keys.join(",")),
            fields: ["key", "summary"],
            start_at: 0,
            max_results: MAX_RESULTS,
            validate_query: "warn",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
}

/// Resolves keys with one `issue IN (...)` search against the Jira REST API.
pub struct JiraSearchResolver {
    base_url: String,
    authorization: String,
    agent: ureq::Agent,
}

impl JiraSearchResolver {
    pub fn new(details: &TrackerDetails) -> Self {
        let mut base_url = details.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let credentials = STANDARD.encode(format!("{}:{}", details.username, details.token));
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(TIMEOUT))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            base_url,
            authorization: format!("Basic {credentials}"),
            agent,
        }
    }

    fn issue_url(&self, key: &str) -> String {
        format!("{}browse/{key}", self.base_url)
    }
}

impl IssueResolver for JiraSearchResolver {
    fn name(&self) -> &str {
        TRACKER
    }

    fn resolve(&self, keys: &[String]) -> Result<Vec<AffectedIssue>, TrackerError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let request = serde_json::to_string(&SearchRequest::for_keys(keys))
            .map_err(|source| TrackerError::Json { tracker: TRACKER, source })?;
        tracing::info!(%request, "searching Jira");

        let http = |source: ureq::Error| TrackerError::Http { tracker: TRACKER, source };
        let mut response = self
            .agent
            .post(&format!("{}{SEARCH_PATH}", self.base_url))
            .header("Authorization", &self.authorization)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .send(&request)
            .map_err(http)?;
        let status = response.status();
        let body = response.body_mut().read_to_string().map_err(http)?;

        if !status.is_success() {
            return Err(TrackerError::Status {
                tracker: TRACKER,
                status: status.as_u16(),
                body,
            });
        }

        let result: SearchResult = serde_json::from_str(&body)
            .map_err(|source| TrackerError::Json { tracker: TRACKER, source })?;
        if result.total > result.issues.len() {
            tracing::warn!(
                total = result.total,
                returned = result.issues.len(),
                "Jira search matched more issues than one page holds; the rest are not collected"
            );
        }

        Ok(result
            .issues
            .into_iter()
            .map(|issue| {
                tracing::info!(key = %issue.key, summary = %issue.fields.summary, "found Jira issue");
                AffectedIssue {
                    url: self.issue_url(&issue.key),
                    key: issue.key,
                    summary: issue.fields.summary,
                    aggregated: false,
                }
            })
            .collect())
    }
}
