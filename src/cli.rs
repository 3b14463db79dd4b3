use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::commands::isolate::{self, IsolateOptions};
use crate::commands::prune::{self, PruneOptions};
use crate::commands::status::{self, StatusOptions};
use crate::commands::{CommandReport, migrate};
use crate::logging;
use crate::shellenv::runs::PruneMode;

/// Per-user HPC shell environment bootstrap: isolates a clean cluster
/// profile from legacy dotfiles and prunes aged run directories.
#[derive(Debug, Parser)]
#[command(name = "hpcenv", version, about, arg_required_else_help = true)]
pub struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    /// Suppress informational status lines (warnings and errors still print).
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Back up, freeze legacy dotfiles, generate the cluster router, and emit a rollback script.
    Migrate,
    /// Second-stage total isolation: pins legacy references before generating the router.
    Isolate(IsolateArgs),
    /// Report or remove aged run directories under $WORKSPACE/runs.
    Prune(PruneArgs),
    /// Show managed files, legacy copies, snapshots, and the router branch for a host.
    Status(StatusArgs),
}

#[derive(Debug, Clone, Args)]
struct IsolateArgs {
    /// Confirm the advanced isolation pass.
    #[arg(long)]
    confirm: bool,
}

#[derive(Debug, Clone, Args)]
struct PruneArgs {
    /// `dry-run` only reports; `clean` removes eligible directories.
    #[arg(value_enum, default_value_t = PruneMode::DryRun)]
    mode: PruneMode,
}

#[derive(Debug, Clone, Args)]
struct StatusArgs {
    /// Evaluate the router for this hostname instead of the current one.
    #[arg(long, value_name = "HOST")]
    hostname: Option<String>,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

/// Parse arguments, run the command, and print its report. Returns whether
/// the report came back clean.
pub fn run() -> Result<bool> {
    let cli = Cli::parse();
    logging::set_quiet(cli.quiet);

    let report = match &cli.command {
        Command::Migrate => migrate::run()?,
        Command::Isolate(args) => isolate::run(&IsolateOptions {
            confirm: args.confirm,
        })?,
        Command::Prune(args) => prune::run(&PruneOptions { mode: args.mode })?,
        Command::Status(args) => status::run(&StatusOptions {
            hostname: args.hostname.clone(),
        })?,
    };

    print_report(&report, cli.json)?;
    Ok(report.ok)
}
