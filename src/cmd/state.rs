/*!
`state.rs` - move the saved configuration in and out of the state store.

  mlr-workbench state export pipeline.yaml     (YAML by extension, JSON otherwise)
  mlr-workbench state import pipeline.json
*/

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cmd::format::{Role, StyleOptions, color, emoji};
use crate::cmd::shared::AppContext;
use crate::command::synthesize;
use crate::store::{StateStore, read_config_file, write_config_file};

#[derive(Args, Debug)]
pub struct StateArgs {
    #[command(subcommand)]
    pub action: StateAction,
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Write the saved configuration to a file
    Export {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Replace the saved configuration with one read from a file
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

pub fn execute_state(ctx: &AppContext, args: StateArgs) -> Result<()> {
    let style = StyleOptions::detect();
    match args.action {
        StateAction::Export { path } => {
            let (config, saved) = ctx.load_config()?;
            if !saved {
                tracing::warn!(path = %ctx.state_path.display(), "no saved state; exporting defaults");
            }
            write_config_file(&path, &config)
                .with_context(|| format!("Failed to export state to {}", path.display()))?;
            println!(
                "{} {}",
                emoji("save", &style),
                color(Role::Success, format!("exported to {}", path.display()), &style)
            );
        }
        StateAction::Import { path } => {
            let config = read_config_file(&path)
                .with_context(|| format!("Failed to import state from {}", path.display()))?;
            ctx.store()
                .save(&config)
                .with_context(|| format!("Failed to save state to {}", ctx.state_path.display()))?;
            let command = synthesize(&config);
            println!(
                "{} {}",
                emoji("success", &style),
                color(Role::Success, format!("imported {}", path.display()), &style)
            );
            if !command.is_empty() {
                println!("{command}");
            }
        }
    }
    Ok(())
}
