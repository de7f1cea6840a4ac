mod cmd_collect_issues;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// Log filter, e.g. `EBI_LOG=debug` or `EBI_LOG=ebi_vcs=trace`.
const LOG_ENV: &str = "EBI_LOG";

#[derive(Parser)]
#[command(name = "ebi", version, about = "Extended build info for CI builds")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record the git reference of the working copy and the issues it touched
    /// since the previous published build
    #[command(alias = "ci")]
    CollectIssues(cmd_collect_issues::CollectIssuesArgs),
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    match cli.cmd {
        Command::CollectIssues(args) => cmd_collect_issues::execute(&cwd, &args),
    }
}
