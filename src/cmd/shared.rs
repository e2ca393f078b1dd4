/*!
shared.rs - helpers used by several subcommands.

  - AppContext: resolved global options (state file, tool program)
  - runtime(): tokio runtime for the async subcommands
  - output_error(): JSON envelope or red box, then bail
  - config_json / render_config: the two views of a Configuration
*/

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::cmd::format::{Role, StyleOptions, box_header, color, emoji, table};
use crate::command::synthesize;
use crate::config::Configuration;
use crate::error::StoreError;
use crate::preview::PreviewSettings;
use crate::store::{FileStateStore, StateStore};

/* ---- Global Context ---- */

/// Global options after CLI/env resolution.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub state_path: PathBuf,
    pub program: String,
}

impl AppContext {
    pub fn store(&self) -> FileStateStore {
        FileStateStore::new(&self.state_path)
    }

    /// Stored configuration, or defaults when nothing was saved yet. The flag says which.
    pub fn load_config(&self) -> Result<(Configuration, bool)> {
        match self.store().load() {
            Ok(config) => Ok((config, true)),
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(path = %self.state_path.display(), "no saved state; using defaults");
                Ok((Configuration::default(), false))
            }
            Err(e) => Err(e).context("Failed to load saved state"),
        }
    }

    pub fn settings(&self) -> PreviewSettings {
        PreviewSettings {
            program: self.program.clone(),
            ..PreviewSettings::default()
        }
    }
}

/// Multi-threaded runtime for the subcommands that spawn processes.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")
}

pub fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read standard input")?;
    Ok(buf)
}

/* ---- Output Helpers ---- */

/// Reports `msg` (JSON envelope or boxed error) and returns it as an error.
pub fn output_error(json: bool, title: &str, msg: &str) -> Result<()> {
    if json {
        crate::utils::output::print(&crate::utils::output::error(msg));
    } else {
        let style = StyleOptions::detect();
        let boxed = box_header(
            format!("{} {title}", emoji("error", &style)),
            Some(color(Role::Error, msg, &style)),
            &style,
        );
        eprintln!("{boxed}");
    }
    anyhow::bail!(msg.to_string())
}

/// `{"command": ..., "configuration": {...}}`
pub fn config_json(config: &Configuration) -> Value {
    json!({
        "command": synthesize(config),
        "configuration": config,
    })
}

/// Rows `# | ON | VERB` (1-based index, as the watch commands expect).
pub fn verb_rows(config: &Configuration) -> Vec<Vec<String>> {
    config
        .verbs
        .iter()
        .enumerate()
        .map(|(i, v)| {
            vec![
                (i + 1).to_string(),
                if v.enabled { "yes" } else { "no" }.to_string(),
                v.text.clone(),
            ]
        })
        .collect()
}

/// Header with the synthesized command, a settings line, and the verb table.
pub fn render_config(config: &Configuration, style: &StyleOptions) -> String {
    let command = synthesize(config);
    let title = format!("{} Pipeline", emoji("pipeline", style));
    let subtitle = if command.is_empty() {
        "(no enabled verbs)".to_string()
    } else {
        command
    };

    let mut out = vec![box_header(title, Some(subtitle), style)];

    let input = match config.file_input() {
        Some(path) => format!("file {path}"),
        None => "pasted text".to_string(),
    };
    out.push(color(
        Role::Dim,
        format!(
            "input: {input} • in={} out={} ragged={} headerless={} ifs={}{}",
            config.input_format,
            config.output_format,
            config.ragged,
            config.headerless,
            config.effective_separator(),
            if config.options.is_empty() {
                String::new()
            } else {
                format!(" • options: {}", config.options)
            }
        ),
        style,
    ));

    if config.verbs.is_empty() {
        out.push(color(
            Role::Dim,
            format!("{} (no verbs)", emoji("info", style)),
            style,
        ));
    } else {
        out.push(table(&["#", "ON", "VERB"], &verb_rows(config), style));
    }
    out.join("\n")
}
