use serde::{Deserialize, Serialize};

/// Build number placeholder understood by the build-info REST API.
pub const LATEST_BUILD_NUMBER: &str = "LATEST";

/// One VCS entry of a build: where the sources came from and at which commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VcsReference {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// An issue referenced by a build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AffectedIssue {
    pub key: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
    /// Carried over from an earlier build rather than found in this one.
    #[serde(default)]
    pub aggregated: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Tracker {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// The `issues` section of a build-info record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Issues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker: Option<Tracker>,
    #[serde(default)]
    pub aggregate_build_issues: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aggregation_build_status: String,
    #[serde(default)]
    pub affected_issues: Vec<AffectedIssue>,
}

/// Published build metadata, as far as this tool reads it.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub started: String,
    #[serde(default, rename = "vcs")]
    pub vcs_list: Vec<VcsReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Issues>,
}

impl BuildInfo {
    /// First VCS entry whose URL equals any of `urls`.
    pub fn find_vcs<'a>(&'a self, urls: &[&str]) -> Option<&'a VcsReference> {
        self.vcs_list.iter().find(|v| urls.contains(&v.url.as_str()))
    }
}

/// A fragment of build-info recorded locally before the build is published.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Partial {
    /// Unix millis at which the fragment was written.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vcs: Vec<VcsReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issues: Option<Issues>,
}
