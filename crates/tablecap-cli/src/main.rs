//! Tablecap CLI entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use tablecap::{CaptureOutcome, CaptureProfile};
use tablecap_cli::browser::BrowserOptions;
use tablecap_cli::config::{resolve_max_cycles, resolve_target_path, TargetConfig};
use tablecap_cli::{doctor, output, runner};

#[derive(Parser)]
#[command(
    name = "tablecap",
    about = "Capture every row of a lazily rendered web table",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a target from a live page.
    Run {
        /// Path to the target JSON file.
        #[arg(short, long)]
        target: Option<String>,

        #[command(flatten)]
        bounds: Bounds,

        /// Show the browser window.
        #[arg(long)]
        headed: bool,

        /// Chromium binary to launch.
        #[arg(long)]
        chromium: Option<PathBuf>,

        /// Print a JSON envelope instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Capture a target from saved HTML snapshots, in order.
    ///
    /// Snapshot N is the page as rendered after N loader actions.
    Replay {
        /// Path to the target JSON file.
        #[arg(short, long)]
        target: Option<String>,

        /// HTML snapshot files.
        #[arg(required = true)]
        snapshots: Vec<PathBuf>,

        #[command(flatten)]
        bounds: Bounds,

        /// Print a JSON envelope instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Validate a target file.
    Validate {
        /// Path to the target JSON file.
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Check Chromium availability and the target file.
    Doctor {
        /// Path to the target JSON file.
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   tablecap completions bash > ~/.local/share/bash-completion/completions/tablecap
    ///   tablecap completions zsh > ~/.zfunc/_tablecap
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct Bounds {
    /// Cycle bound preset.
    #[arg(long, value_enum, default_value_t = Profile::Complete)]
    profile: Profile,

    /// Upper bound on load-and-capture cycles. Overrides the profile.
    #[arg(long)]
    max_cycles: Option<u32>,
}

impl Bounds {
    fn resolve(&self) -> u32 {
        resolve_max_cycles(self.max_cycles, self.profile.into())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    Fast,
    Complete,
}

impl From<Profile> for CaptureProfile {
    fn from(p: Profile) -> Self {
        match p {
            Profile::Fast => CaptureProfile::Fast,
            Profile::Complete => CaptureProfile::Complete,
        }
    }
}

fn load_target(explicit: Option<&str>) -> anyhow::Result<TargetConfig> {
    let path = resolve_target_path(explicit);
    tracing::debug!("Using target file {}", path.display());
    Ok(TargetConfig::load(&path)?)
}

fn report(target: &TargetConfig, outcome: &CaptureOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        let envelope = output::json_envelope(target.label(), outcome);
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        let records: Vec<_> = outcome.records.iter().cloned().collect();
        if records.is_empty() {
            println!("(no rows captured)");
        } else {
            print!("{}", output::render_table(&target.column_names(), &records));
        }
        println!();
        println!("{}", output::summary(outcome));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli.command).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            target,
            bounds,
            headed,
            chromium,
            json,
        } => {
            let target = load_target(target.as_deref())?;
            let options = BrowserOptions {
                headed,
                chromium_path: chromium,
            };
            let outcome = runner::capture_live(&target, &options, bounds.resolve()).await?;
            report(&target, &outcome, json)?;
        }

        Commands::Replay {
            target,
            snapshots,
            bounds,
            json,
        } => {
            let target = load_target(target.as_deref())?;
            let pages = runner::read_snapshots(&snapshots)?;
            let outcome = runner::capture_replay(&target, pages, bounds.resolve()).await?;
            report(&target, &outcome, json)?;
        }

        Commands::Validate { target } => {
            let path = resolve_target_path(target.as_deref());
            let target = TargetConfig::load(&path)
                .with_context(|| format!("{} is not a valid target", path.display()))?;
            println!(
                "Valid target: {} ({} columns, loader {:?})",
                target.label(),
                target.columns.len(),
                target.loader
            );
        }

        Commands::Doctor { target } => {
            doctor::run(&resolve_target_path(target.as_deref()))?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tablecap", &mut std::io::stdout());
        }
    }
    Ok(())
}
