use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use releaser::analyzer::check_range;
use releaser::cli::{ReleaseRequest, ReleaseRunner, ReleaseSettings};
use releaser::config;
use releaser::domain::Classifier;
use releaser::git::Git2Workspace;
use releaser::ui;

#[derive(Parser)]
#[command(
    name = "releaser",
    version,
    about = "Release conventional commits onto long-lived vN branches"
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(long, global = true, default_value = ".", help = "Path to the git repository")]
    repo: PathBuf,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge the source branch into release lines, update the changelog, tag and push
    Release {
        #[arg(long, help = "Branch to release from [default: release.source, then main]")]
        source: Option<String>,

        #[arg(long = "line", help = "Release line to advance (repeatable)")]
        lines: Vec<String>,

        #[arg(long, help = "Preview what would happen without updating any reference")]
        dry_run: bool,
    },

    /// List commits whose header does not follow the conventional commit format
    Check {
        #[arg(long, default_value = "main", help = "Start of the range (excluded)")]
        from: String,

        #[arg(long, default_value = "HEAD", help = "End of the range (included)")]
        to: String,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "releaser=debug" } else { "releaser=info" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = config::load_config(args.config.as_deref()).context("Error loading config")?;
    let workspace = Git2Workspace::new(
        &args.repo,
        config.release.remote.clone(),
        config.committer.clone(),
    );

    let exit_code = match args.command {
        Command::Release {
            source,
            lines,
            dry_run,
        } => {
            let mut settings = ReleaseSettings::from_config(&config)?;
            if let Some(source) = source {
                settings.source = source;
            }
            settings.dry_run = dry_run;

            let request = ReleaseRequest {
                lines: if lines.is_empty() {
                    config.release.lines.clone()
                } else {
                    lines
                },
            };

            if dry_run {
                ui::display_status("Dry run: no branch or tag will be updated");
            }

            let report = ReleaseRunner::new(settings)
                .run(|| workspace.open(), &request)
                .context("Failed to start release")?;
            ui::display_run_report(&report);
            report.exit_code()
        }
        Command::Check { from, to } => {
            let repo = workspace
                .open()
                .with_context(|| format!("Cannot open repository at {}", args.repo.display()))?;
            let classifier = Classifier::new(config.conventional_commits.clone());
            let report = check_range(&repo, &classifier, &from, &to)?;
            ui::display_check_report(&report, &from, &to);
            i32::from(!report.is_clean())
        }
    };

    std::process::exit(exit_code);
}
