#![forbid(unsafe_code)]

mod cmd;
mod credentials;
mod github;
mod http;
mod output;
mod secureframe;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "sfsync: keep GitHub issues in step with Secureframe compliance tests",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: <config dir>/sfsync/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Reconcile failing tests into GitHub issues",
        long_about = "Fetch Secureframe tests and create, update, close, or reopen one GitHub issue per test. \
                      Without a GitHub token or repository, failing tests are listed instead.",
        after_help = "EXAMPLES:\n    # Sync SOC 2 tests into a repository\n    sfsync sync --github-repo acme/compliance \\\n        --github-token-file ~/.gh-token --bearer-token-file ~/.sf-token --company-id <ID>\n\n    # Show what would change without writing\n    sfsync sync --github-repo acme/compliance --dry-run\n\n    # Several frameworks, JSON report\n    sfsync --json sync --report-keys soc2_alpha,iso27001"
    )]
    Sync(cmd::sync::SyncArgs),

    #[command(
        about = "List Secureframe tests",
        long_about = "List the tests in scope for the report keys, with their status.",
        after_help = "EXAMPLES:\n    # Failing tests only\n    sfsync tests --failing\n\n    # Emit machine-readable output\n    sfsync tests --json"
    )]
    Tests(cmd::tests::TestsArgs),

    #[command(
        about = "Create missing sfsync labels",
        long_about = "Make sure every label a sync could apply exists on the repository.",
        after_help = "EXAMPLES:\n    # Create labels ahead of the first sync\n    sfsync labels --github-repo acme/compliance\n\n    # Only report what is missing\n    sfsync labels --github-repo acme/compliance --dry-run"
    )]
    Labels(cmd::labels::LabelsArgs),

    #[command(
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    sfsync completions bash\n\n    # Generate zsh completions\n    sfsync completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("SFSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "sfsync=debug,info"
        } else {
            "sfsync=info,warn"
        })
    });

    let format = env::var("SFSYNC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let output = cli.output_mode();

    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    let config = sfsync_core::load_config(cli.config.as_deref())?;
    debug!(?config, "loaded config");

    match &cli.command {
        Commands::Sync(args) => cmd::sync::run_sync(args, &config, output),
        Commands::Tests(args) => cmd::tests::run_tests(args, &config, output),
        Commands::Labels(args) => cmd::labels::run_labels(args, &config, output),
        Commands::Completions(_) => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output_mode();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if output::render_error(output, &CliError::from(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
