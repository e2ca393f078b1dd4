/*!
Subcommand dispatcher module.

Layout:
  src/cmd/
    mod.rs       (this file: declarations + re-exports)
    shared.rs    (AppContext, runtime, output_error, config rendering)
    format.rs    (color / box / table helpers for human output)
    show.rs      (ShowArgs    + execute_show)
    parse.rs     (ParseArgs   + execute_parse)
    preview.rs   (PreviewArgs + execute_preview)
    run.rs       (RunArgs     + execute_run)
    watch.rs     (WatchArgs   + execute_watch)
    state.rs     (StateArgs   + execute_state)

Conventions:
  - Each subcommand module exposes one `execute_*(&AppContext, Args) -> anyhow::Result<()>`.
  - Argument structs derive `clap::Args` and are kept minimal.
  - `--json` paths print `{"status": ...}` envelopes and never use `format`.
*/

pub mod format;
pub mod parse;
pub mod preview;
pub mod run;
pub mod shared;
pub mod show;
pub mod state;
pub mod watch;

pub use parse::{ParseArgs, execute_parse};
pub use preview::{PreviewArgs, execute_preview};
pub use run::{RunArgs, execute_run};
pub use shared::AppContext;
pub use show::{ShowArgs, execute_show};
pub use state::{StateArgs, execute_state};
pub use watch::{WatchArgs, execute_watch};
