use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::extract::IssueKeyExtractor;

/// Matches keys like `PROJ-123` or `proj-123`; group 1 is the whole key.
pub const DEFAULT_KEY_PATTERN: &str =
    r"(((?:\p{Lu}[\p{Lu}\p{N}_]+|\p{Ll}[\p{Ll}\p{N}_]+))-\p{N}+)";
pub const DEFAULT_KEY_GROUP_INDEX: usize = 1;
/// How many commits a scan looks at when no earlier revision bounds it.
pub const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported tracker: {0}")]
    UnsupportedTracker(String),
    #[error("missing {tracker} details: {missing} (pass --tracker-url, --tracker-username and --tracker-token or set int_{env_name}_url, int_{env_name}_username and int_{env_name}_token)")]
    MissingTrackerDetails {
        tracker: &'static str,
        env_name: String,
        missing: String,
    },
    #[error("invalid issue key pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("issue key pattern {pattern:?} has {groups} capturing group(s); key group index {index} is out of range")]
    GroupIndexOutOfRange {
        pattern: String,
        groups: usize,
        index: usize,
    },
    #[error("log limit must be at least 1")]
    ZeroLogLimit,
}

/// Supported issue trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerKind {
    Jira,
}

impl TrackerKind {
    /// Name recorded in build-info.
    pub fn name(&self) -> &'static str {
        match self {
            TrackerKind::Jira => "JIRA",
        }
    }
}

impl FromStr for TrackerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("jira") {
            Ok(TrackerKind::Jira)
        } else {
            Err(ConfigError::UnsupportedTracker(s.to_string()))
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where and as whom to reach the tracker.
#[derive(Clone, PartialEq, Eq)]
pub struct TrackerDetails {
    /// Always ends with `/`.
    pub base_url: String,
    pub username: String,
    pub token: String,
}

impl fmt::Debug for TrackerDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerDetails")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("token", &"[MASKED]")
            .finish()
    }
}

/// Validated issue collection settings. Built once through [`IssueTrackerConfig::builder`].
#[derive(Debug, Clone)]
pub struct IssueTrackerConfig {
    tracker: TrackerKind,
    details: TrackerDetails,
    key_pattern: Regex,
    key_group_index: usize,
    log_limit: usize,
    aggregate: bool,
    aggregation_status: String,
}

impl IssueTrackerConfig {
    /// Start a builder for the tracker named `tracker` (as given on the command line).
    pub fn builder(tracker: impl Into<String>) -> IssueTrackerConfigBuilder {
        IssueTrackerConfigBuilder {
            tracker: tracker.into(),
            base_url: String::new(),
            username: String::new(),
            token: String::new(),
            key_pattern: None,
            key_group_index: None,
            log_limit: DEFAULT_LOG_LIMIT,
            aggregate: false,
            aggregation_status: String::new(),
        }
    }

    pub fn tracker(&self) -> TrackerKind {
        self.tracker
    }

    pub fn details(&self) -> &TrackerDetails {
        &self.details
    }

    pub fn key_pattern(&self) -> &Regex {
        &self.key_pattern
    }

    pub fn key_group_index(&self) -> usize {
        self.key_group_index
    }

    pub fn log_limit(&self) -> usize {
        self.log_limit
    }

    pub fn aggregate(&self) -> bool {
        self.aggregate
    }

    pub fn aggregation_status(&self) -> &str {
        &self.aggregation_status
    }

    pub fn extractor(&self) -> IssueKeyExtractor {
        IssueKeyExtractor::new(self.key_pattern.clone(), self.key_group_index)
    }
}

#[derive(Debug, Clone)]
pub struct IssueTrackerConfigBuilder {
    tracker: String,
    base_url: String,
    username: String,
    token: String,
    key_pattern: Option<String>,
    key_group_index: Option<usize>,
    log_limit: usize,
    aggregate: bool,
    aggregation_status: String,
}

impl IssueTrackerConfigBuilder {
    pub fn with_details(
        mut self,
        base_url: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        self.base_url = base_url.into();
        self.username = username.into();
        self.token = token.into();
        self
    }

    /// When no base URL was given, read all three details from the
    /// `int_<tracker>_url`, `int_<tracker>_username` and `int_<tracker>_token`
    /// integration variables through `lookup`.
    pub fn with_integration_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if !self.base_url.is_empty() {
            return self;
        }
        tracing::debug!(tracker = %self.tracker, "loading tracker details from integration");
        let name = self.tracker.clone();
        let var = |suffix: &str| lookup(&format!("int_{name}_{suffix}")).unwrap_or_default();
        self.base_url = var("url");
        self.username = var("username");
        self.token = var("token");
        self
    }

    /// Empty or `None` keeps the default pattern.
    pub fn with_key_pattern(mut self, pattern: Option<&str>) -> Self {
        self.key_pattern = pattern.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }

    pub fn with_key_group_index(mut self, index: usize) -> Self {
        self.key_group_index = Some(index);
        self
    }

    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit;
        self
    }

    pub fn with_aggregate(mut self, aggregate: bool, status: impl Into<String>) -> Self {
        self.aggregate = aggregate;
        self.aggregation_status = status.into();
        self
    }

    pub fn build(self) -> Result<IssueTrackerConfig, ConfigError> {
        let tracker: TrackerKind = self.tracker.parse()?;

        let missing: Vec<&str> = [
            ("url", &self.base_url),
            ("username", &self.username),
            ("token", &self.token),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingTrackerDetails {
                tracker: tracker.name(),
                env_name: self.tracker.clone(),
                missing: missing.join(", "),
            });
        }

        let pattern = self
            .key_pattern
            .unwrap_or_else(|| DEFAULT_KEY_PATTERN.to_string());
        let key_pattern = Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        let key_group_index = self.key_group_index.unwrap_or(DEFAULT_KEY_GROUP_INDEX);
        let groups = key_pattern.captures_len() - 1;
        if key_group_index > groups {
            return Err(ConfigError::GroupIndexOutOfRange {
                pattern,
                groups,
                index: key_group_index,
            });
        }

        if self.log_limit == 0 {
            return Err(ConfigError::ZeroLogLimit);
        }

        let mut base_url = self.base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(IssueTrackerConfig {
            tracker,
            details: TrackerDetails {
                base_url,
                username: self.username,
                token: self.token,
            },
            key_pattern,
            key_group_index,
            log_limit: self.log_limit,
            aggregate: self.aggregate,
            aggregation_status: self.aggregation_status,
        })
    }
}
