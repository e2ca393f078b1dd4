/*!
`preview.rs` - one preview cycle from the command line.

Starts from the saved configuration, applies `--command` (parsed onto it) and the input
choice, then runs a single cycle through the preview session with no debounce. On success
the configuration is persisted, exactly as the live editor does.

Input precedence: `--input FILE` > `--text TEXT` > the saved input file > standard input.

JSON Output Shape:
{
  "status": "ok" | "error",
  "state": "success" | "failure" | "idle",
  "command": "mlr ...",
  "format": "json",
  "output": "...",
  "error": "...",
  "elapsed_ms": 12
}
*/

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::cmd::format::{Role, StyleOptions, box_header, color, emoji, indent_block};
use crate::cmd::shared::{AppContext, output_error, read_stdin};
use crate::command::parse_command;
use crate::config::InputMode;
use crate::preview::{Edit, PreviewOutcome, PreviewSession, PreviewState};
use crate::utils::output;

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Read the sample from this file (switches to file input)
    #[arg(short, long, value_name = "FILE", conflicts_with = "text")]
    pub input: Option<PathBuf>,

    /// Use this text as pasted input
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,

    /// Command line to parse onto the saved configuration first
    #[arg(short, long, value_name = "CMD")]
    pub command: Option<String>,

    /// Lines sampled from the head of the input
    #[arg(long, value_name = "N")]
    pub lines: Option<usize>,

    /// Output JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,
}

pub fn execute_preview(ctx: &AppContext, args: PreviewArgs) -> Result<()> {
    let (mut config, _) = ctx.load_config()?;

    if let Some(cmd) = &args.command {
        config = match parse_command(cmd, &config) {
            Ok(c) => c,
            Err(e) => return output_error(args.json, "Parse Error", &e.to_string()),
        };
    }

    let mut text = String::new();
    if let Some(path) = &args.input {
        config = config.with_input_file(path.display().to_string());
    } else if let Some(t) = &args.text {
        config = config.with_input_mode(InputMode::Text);
        text = t.clone();
    } else if config.file_input().is_none() {
        text = read_stdin()?;
    }

    let mut settings = ctx.settings();
    settings.debounce = Duration::ZERO;
    if let Some(n) = args.lines {
        settings.sample_lines = n;
    }
    let invoker = Arc::new(settings.invoker());
    let store = Arc::new(ctx.store());

    let started = Instant::now();
    let rt = crate::cmd::shared::runtime()?;
    let state = rt.block_on(async move {
        let mut session = PreviewSession::spawn(invoker, store, settings);
        let stamp = session.submit(Edit::new(config, text))?;
        let state = session.settled(stamp).await;
        session.shutdown().await;
        state
    })?;
    let elapsed_ms = started.elapsed().as_millis();

    report(&state, args.json, elapsed_ms)
}

fn report(state: &PreviewState, json: bool, elapsed_ms: u128) -> Result<()> {
    let style = StyleOptions::detect();
    match state {
        PreviewState::Displaying {
            outcome: PreviewOutcome::Success(success),
            ..
        } => {
            if json {
                output::print(&output::ok(json!({
                    "state": state.name(),
                    "command": success.command,
                    "format": success.format.name(),
                    "output": success.output,
                    "elapsed_ms": elapsed_ms,
                })));
            } else {
                println!(
                    "{}",
                    box_header(
                        format!("{} {}", emoji("success", &style), success.command),
                        Some(format!("{} • {elapsed_ms} ms", success.format)),
                        &style,
                    )
                );
                println!("{}", success.output.trim_end());
            }
            Ok(())
        }
        PreviewState::Displaying {
            outcome: PreviewOutcome::Failure { message, .. },
            ..
        } => {
            if json {
                output::print(&json!({
                    "status": "error",
                    "state": state.name(),
                    "error": message,
                    "elapsed_ms": elapsed_ms,
                }));
            } else {
                let boxed = box_header(
                    format!("{} Preview Failed", emoji("error", &style)),
                    None::<&str>,
                    &style,
                );
                eprintln!("{boxed}");
                eprintln!("{}", color(Role::Error, indent_block(message, "  "), &style));
            }
            anyhow::bail!("preview failed: {message}")
        }
        other => {
            if json {
                output::print(&output::ok(json!({
                    "state": other.name(),
                    "command": "",
                    "output": "",
                    "elapsed_ms": elapsed_ms,
                })));
            } else {
                println!(
                    "{} {}",
                    emoji("info", &style),
                    color(
                        Role::Dim,
                        "nothing to preview: add an enabled verb and some input",
                        &style
                    )
                );
            }
            Ok(())
        }
    }
}
