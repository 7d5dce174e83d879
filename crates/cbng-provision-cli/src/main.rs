use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cbng_provision_core::RebuildPolicy;

mod completion;
mod dispatch;
mod logging;
mod render;

use completion::CliCompletionShell;
use render::{OutputStyle, TerminalRenderer};

#[derive(Parser, Debug)]
#[command(name = "cbng-provision")]
#[command(
    about = "Provision a ClueBot NG workspace from the pinned cluebotng-core package",
    version
)]
struct Cli {
    /// Provision config (TOML). Built-in defaults apply when omitted.
    #[arg(long, env = "CBNG_PROVISION_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Overrides `paths.workspace` from config.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Disable styled output and progress spinners.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch, verify, install, build databases and finalize (default).
    Run(RunArgs),
    /// Print the resolved URL and paths without touching anything.
    Plan {
        #[arg(long)]
        json: bool,
    },
    /// Write a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(Args, Debug, Default, Clone, Copy)]
struct RunArgs {
    /// Re-run every stage even if the workspace is already provisioned.
    #[arg(long)]
    force: bool,

    /// Overrides `databases.rebuild` from config.
    #[arg(long, value_enum)]
    rebuild: Option<RebuildArg>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum RebuildArg {
    Always,
    WhenSourceChanged,
}

impl From<RebuildArg> for RebuildPolicy {
    fn from(value: RebuildArg) -> Self {
        match value {
            RebuildArg::Always => RebuildPolicy::Always,
            RebuildArg::WhenSourceChanged => RebuildPolicy::WhenSourceChanged,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let renderer = TerminalRenderer::from_style(OutputStyle::detect(cli.plain));
    logging::init_tracing(cli.verbose, cli.log_format, renderer.style());

    match dispatch::run_cli(cli, renderer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            renderer.print_error(&err);
            ExitCode::FAILURE
        }
    }
}
