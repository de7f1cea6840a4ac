use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;

use ebi_collect::{CollectIssuesCommand, IssueCollection};
use ebi_core::config::{DEFAULT_KEY_GROUP_INDEX, DEFAULT_LOG_LIMIT};
use ebi_core::IssueTrackerConfig;
use ebi_store::server::servers_file;
use ebi_store::{store_root, ArtifactoryClient, BuildKey, PartialsStore, ServerDetails};

const BUILD_NAME_ENV: &str = "EBI_BUILD_NAME";
const BUILD_NUMBER_ENV: &str = "EBI_BUILD_NUMBER";

#[derive(Debug, Args)]
pub struct CollectIssuesArgs {
    /// [build-name] [build-number] [path-to-.git]. A single argument is the
    /// .git path; name and number then come from EBI_BUILD_NAME and
    /// EBI_BUILD_NUMBER
    #[arg(value_name = "ARGS", num_args = 0..=3)]
    pub args: Vec<String>,
    /// Server ID from servers.json (default server when omitted)
    #[arg(long, env = "EBI_SERVER_ID")]
    pub server_id: Option<String>,
    /// Project key the build belongs to
    #[arg(long, env = "EBI_PROJECT")]
    pub project: Option<String>,
    /// Issue tracker name (jira). Without it only the git reference is recorded
    #[arg(long)]
    pub tracker: Option<String>,
    /// Tracker base URL (falls back to int_<tracker>_url)
    #[arg(long)]
    pub tracker_url: Option<String>,
    /// Tracker user name (falls back to int_<tracker>_username)
    #[arg(long)]
    pub tracker_username: Option<String>,
    /// Tracker API token (falls back to int_<tracker>_token)
    #[arg(long)]
    pub tracker_token: Option<String>,
    /// Regular expression matching issue keys in commit messages
    #[arg(long)]
    pub regexp: Option<String>,
    /// Capture group of --regexp holding the issue key
    #[arg(long, default_value_t = DEFAULT_KEY_GROUP_INDEX)]
    pub key_group_index: usize,
    /// Maximum number of commits to scan
    #[arg(long, default_value_t = DEFAULT_LOG_LIMIT)]
    pub log_limit: usize,
    /// Mark the build to aggregate issues from previous builds
    #[arg(long)]
    pub aggregate: bool,
    /// Stop aggregating at builds with this release status
    #[arg(long, default_value = "")]
    pub aggregation_status: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Positionals {
    build_name: Option<String>,
    build_number: Option<String>,
    dot_git_path: Option<PathBuf>,
}

fn split_positionals(args: &[String]) -> anyhow::Result<Positionals> {
    let positionals = match args {
        [] => Positionals::default(),
        [path] => Positionals {
            dot_git_path: Some(PathBuf::from(path)),
            ..Default::default()
        },
        [name, number] => Positionals {
            build_name: Some(name.clone()),
            build_number: Some(number.clone()),
            dot_git_path: None,
        },
        [name, number, path] => Positionals {
            build_name: Some(name.clone()),
            build_number: Some(number.clone()),
            dot_git_path: Some(PathBuf::from(path)),
        },
        _ => bail!(
            "wrong number of arguments ({}); expected [build-name] [build-number] [path-to-.git]",
            args.len()
        ),
    };
    Ok(positionals)
}

fn build_key(
    positionals: &Positionals,
    project: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<BuildKey> {
    let name = positionals
        .build_name
        .clone()
        .or_else(|| lookup(BUILD_NAME_ENV))
        .unwrap_or_default();
    let number = positionals
        .build_number
        .clone()
        .or_else(|| lookup(BUILD_NUMBER_ENV))
        .unwrap_or_default();
    BuildKey::new(name, number, project.map(str::to_string)).with_context(|| {
        format!("pass the build name and number as arguments or set {BUILD_NAME_ENV} and {BUILD_NUMBER_ENV}")
    })
}

fn tracker_config(
    args: &CollectIssuesArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Option<IssueTrackerConfig>> {
    let Some(tracker) = args.tracker.as_deref().filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let config = IssueTrackerConfig::builder(tracker)
        .with_details(
            args.tracker_url.clone().unwrap_or_default(),
            args.tracker_username.clone().unwrap_or_default(),
            args.tracker_token.clone().unwrap_or_default(),
        )
        .with_integration_env(lookup)
        .with_key_pattern(args.regexp.as_deref())
        .with_key_group_index(args.key_group_index)
        .with_log_limit(args.log_limit)
        .with_aggregate(args.aggregate, args.aggregation_status.as_str())
        .build()
        .context("invalid issue tracker configuration")?;
    tracing::debug!(details = ?config.details(), pattern = %config.key_pattern(), "issue tracker configured");
    Ok(Some(config))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

pub fn execute(cwd: &Path, args: &CollectIssuesArgs) -> anyhow::Result<()> {
    let positionals = split_positionals(&args.args)?;
    let build = build_key(&positionals, args.project.as_deref(), env_var)?;
    // Validated before anything is written or scanned.
    let tracker = tracker_config(args, env_var)?;

    let root = store_root();
    let partials = PartialsStore::new(root.join("builds"));
    let command = CollectIssuesCommand::new(build.clone(), cwd, &partials)
        .with_dot_git_path(positionals.dot_git_path);

    let summary = match &tracker {
        Some(config) => {
            let server = ServerDetails::load(args.server_id.as_deref(), &servers_file(&root), env_var)
                .context("failed to load server configuration")?;
            let store = ArtifactoryClient::new(&server);
            let resolver = ebi_tracker::resolver_for(config);
            command
                .with_issues(IssueCollection {
                    config,
                    store: &store,
                    resolver: resolver.as_ref(),
                })
                .run()
        }
        None => command.run(),
    }
    .with_context(|| format!("collect-issues failed for {}/{}", build.name, build.number))?;

    println!(
        "Recorded {} @ {} with {} issue(s) for {}/{}",
        if summary.vcs.url.is_empty() { "<no remote>" } else { summary.vcs.url.as_str() },
        summary.vcs.revision,
        summary.issues.len(),
        build.name,
        build.number
    );
    for issue in &summary.issues {
        println!("  {}  {}", issue.key, issue.summary);
    }
    Ok(())
}
