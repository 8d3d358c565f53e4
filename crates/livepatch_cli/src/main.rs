//! livepatch CLI: inspect, compare and patch class files from the command line.
//!
//! `livepatch inspect` dumps a parsed class, `livepatch diff` compares two
//! versions of a class, `livepatch groups` lists the invalidation groups of a
//! key-meta class, and `livepatch patch` runs one live-patch pass over a
//! directory of freshly compiled classes.

#![warn(missing_docs)]

mod diff;
mod groups;
mod inspect;
mod patch;
mod pipeline;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// livepatch: live code patching for JVM class files.
#[derive(Parser, Debug)]
#[command(name = "livepatch", version, about = "Live patching toolkit")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `livepatch.toml` file or the directory holding it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the parsed model of a class file.
    Inspect(InspectArgs),
    /// Compare two versions of a class file.
    Diff(DiffArgs),
    /// List the invalidation groups recorded in a key-meta class.
    Groups(GroupsArgs),
    /// Run one live-patch pass over compiled classes.
    Patch(PatchArgs),
}

/// Arguments for `livepatch inspect`.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// The class file.
    pub class: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `livepatch diff`.
#[derive(Parser, Debug)]
pub struct DiffArgs {
    /// The deployed version.
    pub old: PathBuf,

    /// The new version.
    pub new: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `livepatch groups`.
#[derive(Parser, Debug)]
pub struct GroupsArgs {
    /// The key-meta class file.
    pub key_meta: PathBuf,

    /// The source file the class was compiled from.
    #[arg(short, long)]
    pub source: PathBuf,

    /// Changed lines; prints the group they select.
    #[arg(long, value_delimiter = ',')]
    pub lines: Vec<u32>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `livepatch patch`.
#[derive(Parser, Debug)]
pub struct PatchArgs {
    /// The edited source file.
    #[arg(short, long)]
    pub source: PathBuf,

    /// Directory holding the classes compiled from the edited source.
    #[arg(long)]
    pub classes: PathBuf,

    /// Directory holding the deployed classes (default: from `livepatch.toml`).
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Names of the edited declarations.
    #[arg(long, num_args = 1..)]
    pub changed: Vec<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Inspect(ref args) => inspect::run(args, &global),
        Command::Diff(ref args) => diff::run(args, &global),
        Command::Groups(ref args) => groups::run(args, &global),
        Command::Patch(ref args) => patch::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the log subscriber. `RUST_LOG` wins over the flags.
fn init_logging(quiet: bool, verbose: bool) {
    let default = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
