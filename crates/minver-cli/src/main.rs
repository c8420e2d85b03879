//! minver - Minimum-Version Build Verifier CLI
//!
//! ## Commands
//!
//! - `verify-lower-bounds`: strict build, pin dependencies to their lower
//!   bounds, strict build again
//! - `check-distro-versions`: compare declared versions against a distro
//! - `show-flags`: print the strict `RUSTFLAGS` value

mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{warn, Level};

use minver_core::{
    init_tracing, ComparatorConfig, DistroComparator, LowerBoundVerifier, ManifestRef,
    ProcessExecutor, StrictFlagSet, VerifierConfig,
};

/// Exit code used when interrupted, matching shell convention for SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "minver")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify that declared dependency lower bounds actually build", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build strictly, pin dependencies to their lower bounds, build again
    VerifyLowerBounds(VerifyArgs),

    /// Compare declared dependency versions against a distro release
    CheckDistroVersions(CompareArgs),

    /// Print the strict flag set as a RUSTFLAGS value
    ShowFlags {
        /// Additional lint to deny (repeatable)
        #[arg(long = "deny", value_name = "LINT")]
        deny: Vec<String>,
    },
}

#[derive(Args)]
struct VerifyArgs {
    /// Path to Cargo.toml (default: ./Cargo.toml)
    #[arg(long, env = "MANIFEST_PATH")]
    manifest_path: Option<PathBuf>,

    /// Lower-bound mutator executable
    #[arg(long, env = "SET_LOWER_BOUNDS")]
    set_lower_bounds: Option<String>,

    /// Build program
    #[arg(long, env = "CARGO", default_value = "cargo")]
    cargo: String,

    /// Additional lint to deny on both builds (repeatable)
    #[arg(long = "deny", value_name = "LINT")]
    deny: Vec<String>,

    /// Do not pass --all-features to the builds
    #[arg(long)]
    no_all_features: bool,

    /// Per-command timeout in seconds (0 = none)
    #[arg(long, default_value = "0")]
    timeout_secs: u64,

    /// Leave the rewritten manifest on disk instead of restoring it
    #[arg(
        long,
        env = "MINVER_KEEP_REWRITTEN",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    keep_rewritten: bool,

    /// Write the full JSON report to this file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[derive(Args)]
struct CompareArgs {
    /// Path to Cargo.toml (default: ./Cargo.toml)
    #[arg(long, env = "MANIFEST_PATH")]
    manifest_path: Option<PathBuf>,

    /// Distro version comparator executable
    #[arg(long, env = "COMPARE_FEDORA_VERSIONS")]
    compare_fedora_versions: Option<String>,

    /// Release identifier to compare against
    #[arg(long, env = "FEDORA_RELEASE")]
    release: Option<String>,

    /// Timeout in seconds (0 = none)
    #[arg(long, default_value = "0")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::VerifyLowerBounds(args) => cmd_verify(args).await,
        Commands::CheckDistroVersions(args) => cmd_compare(args).await,
        Commands::ShowFlags { deny } => cmd_show_flags(&deny),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn resolve_manifest(path: Option<PathBuf>) -> Result<ManifestRef> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(ManifestRef::resolve(path, &cwd))
}

/// Run the lower-bound verification workflow
async fn cmd_verify(args: VerifyArgs) -> Result<ExitCode> {
    let manifest = resolve_manifest(args.manifest_path)?;

    let mut config = VerifierConfig::new(manifest, args.set_lower_bounds);
    config.cargo = args.cargo;
    config.extra_denied = args.deny;
    config.all_features = !args.no_all_features;
    config.timeout_secs = args.timeout_secs;
    config.restore_manifest = !args.keep_rewritten;

    let verifier = LowerBoundVerifier::new(config, Arc::new(ProcessExecutor));

    // Dropping the verification future kills the running child and restores
    // the manifest snapshot.
    let report = tokio::select! {
        report = verifier.verify() => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, verification aborted");
            eprintln!("verify-lower-bounds interrupted");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    };

    print!("{}", output::render_summary(&report));

    if let Some(path) = &args.report {
        let json = report.to_json().context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if report.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        if let Some(message) = output::render_failure(&report) {
            eprint!("{message}");
        }
        Ok(ExitCode::FAILURE)
    }
}

/// Run the distro version comparator and surface its exit status
async fn cmd_compare(args: CompareArgs) -> Result<ExitCode> {
    let config = ComparatorConfig {
        manifest: resolve_manifest(args.manifest_path)?,
        comparator: args.compare_fedora_versions,
        release: args.release,
        timeout_secs: args.timeout_secs,
    };

    let comparator = DistroComparator::from_config(&config)?;
    let outcome = comparator
        .run(&ProcessExecutor)
        .await
        .context("Failed to run version comparator")?;

    print!("{}", outcome.output.stdout);
    eprint!("{}", outcome.output.stderr);

    Ok(output::exit_code_for(outcome.exit_code))
}

/// Print the strict flag set
fn cmd_show_flags(deny: &[String]) -> Result<ExitCode> {
    let flags = StrictFlagSet::default().with_denied(deny.iter().cloned());
    println!("{}", flags.to_rustflags());
    Ok(ExitCode::SUCCESS)
}
