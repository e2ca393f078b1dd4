use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod command;
mod config;
mod error;
mod preview;
mod store;
mod utils;

use cmd::{AppContext, ParseArgs, PreviewArgs, RunArgs, ShowArgs, StateArgs, WatchArgs};

/// mlr-workbench - build Miller pipelines and preview them live.
///
/// Commands:
///   mlr-workbench show [--json]
///   mlr-workbench parse [--save] [--json] <COMMAND>...
///   mlr-workbench preview [-i FILE | --text TEXT] [-c CMD] [--lines N] [--json]
///   mlr-workbench run [-i FILE] [-o FILE]
///   mlr-workbench watch [--debounce-ms MS] [--lines N]
///   mlr-workbench state <export|import> <PATH>
///
/// Global flags / env:
///   -v / -vv            Increase verbosity (RUST_LOG overrides)
///   -q / --quiet        Errors only
///   --state PATH        State file (or MLR_WORKBENCH_STATE; default ~/.mlr_desktop_state.json)
///   --mlr PROGRAM       Miller executable (or MLR_BIN; default mlr)
///   --log-dir DIR       Also write JSON logs there, rotated daily (or MLR_WORKBENCH_LOG_DIR)
///
/// Examples:
///   mlr-workbench parse --save 'mlr --icsv --opprint sort -f shape then head -n 4 example.csv'
///   mlr-workbench preview --text "$(head -5 example.csv)" -c 'mlr --c2j cat'
///   printf 'verb add head -n 2\nquit\n' | mlr-workbench watch
#[derive(Parser, Debug)]
#[command(
    name = "mlr-workbench",
    version,
    author,
    about = "mlr-workbench - interactive pipeline builder and live previewer for Miller",
    propagate_version = true,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// State file holding the last successful configuration
    #[arg(long = "state", global = true, value_name = "PATH")]
    state: Option<PathBuf>,

    /// Miller executable
    #[arg(long = "mlr", global = true, value_name = "PROGRAM")]
    mlr: Option<String>,

    /// Directory for daily-rotated JSON log files
    #[arg(long = "log-dir", global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the saved pipeline and its command line
    Show(ShowArgs),

    /// Import a pasted mlr command line
    Parse(ParseArgs),

    /// Run one preview on a bounded sample
    Preview(PreviewArgs),

    /// Run the saved pipeline on the whole input
    Run(RunArgs),

    /// Edit the pipeline line by line with a live preview
    Watch(WatchArgs),

    /// Export or import the saved configuration
    State(StateArgs),
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Flag > env for the log directory
    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| env_non_empty("MLR_WORKBENCH_LOG_DIR").map(PathBuf::from));

    let level = utils::derive_level(cli.verbose, cli.quiet);
    let _log_guard = utils::init_logging(level, log_dir.as_deref())?;
    utils::install_panic_hook();

    let ctx = AppContext {
        state_path: cli
            .state
            .clone()
            .or_else(|| env_non_empty("MLR_WORKBENCH_STATE").map(PathBuf::from))
            .unwrap_or_else(store::default_state_path),
        program: cli
            .mlr
            .clone()
            .or_else(|| env_non_empty("MLR_BIN"))
            .unwrap_or_else(|| command::TOOL_NAME.to_string()),
    };
    tracing::debug!(state = %ctx.state_path.display(), program = %ctx.program, "starting");

    match cli.command {
        Commands::Show(args) => cmd::execute_show(&ctx, args),
        Commands::Parse(args) => cmd::execute_parse(&ctx, args),
        Commands::Preview(args) => cmd::execute_preview(&ctx, args),
        Commands::Run(args) => cmd::execute_run(&ctx, args),
        Commands::Watch(args) => cmd::execute_watch(&ctx, args),
        Commands::State(args) => cmd::execute_state(&ctx, args),
    }
}
