/*!
`parse.rs` - import a pasted `mlr` command line.

The command is parsed onto the saved configuration (or defaults), so an input file chosen
earlier survives a command that names none. With `--save` the result replaces the saved
state; on a parse failure nothing is written.

  mlr-workbench parse 'mlr --icsv --opprint sort -f a then head -n 4 data.csv'
  mlr-workbench parse --save --json -- mlr --c2j cat

JSON Output Shapes:
  { "status": "ok", "saved": false, "command": "...", "configuration": {...} }
  { "status": "error", "error": "...", "kind": "lex" | "semantic", "position": 12 }
*/

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use crate::cmd::format::{Role, StyleOptions, box_header, color, emoji};
use crate::cmd::shared::{AppContext, config_json, render_config};
use crate::command::parse_command;
use crate::error::{ParseError, ParseErrorKind};
use crate::store::StateStore;
use crate::utils::output;

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Persist the parsed configuration
    #[arg(long)]
    pub save: bool,

    /// Output JSON instead of human-readable text
    #[arg(long)]
    pub json: bool,

    /// Command line to import: one quoted argument, or its words after `--`
    #[arg(
        value_name = "COMMAND",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

pub fn execute_parse(ctx: &AppContext, args: ParseArgs) -> Result<()> {
    let input = join_command(&args.command);
    let (current, _) = ctx.load_config()?;

    let parsed = match parse_command(&input, &current) {
        Ok(config) => config,
        Err(e) => return report_parse_error(args.json, &input, &e),
    };

    if args.save {
        ctx.store()
            .save(&parsed)
            .with_context(|| format!("Failed to save state to {}", ctx.state_path.display()))?;
        tracing::info!(path = %ctx.state_path.display(), "parsed command saved");
    }

    if args.json {
        let mut body = config_json(&parsed);
        body["saved"] = args.save.into();
        output::print(&output::ok(body));
        return Ok(());
    }

    let style = StyleOptions::detect();
    println!("{}", render_config(&parsed, &style));
    if args.save {
        println!(
            "{} {}",
            emoji("save", &style),
            color(Role::Success, "saved", &style)
        );
    }
    Ok(())
}

/// A single argument is taken verbatim; several are re-quoted as the shell would need them.
pub fn join_command(words: &[String]) -> String {
    match words {
        [single] => single.clone(),
        _ => shell_words::join(words),
    }
}

/// The input with a caret under the failing byte offset.
pub fn caret_excerpt(input: &str, position: usize) -> String {
    let column = input
        .get(..position.min(input.len()))
        .map(|prefix| prefix.chars().count())
        .unwrap_or(position);
    format!("{input}\n{}^", " ".repeat(column))
}

fn report_parse_error(json: bool, input: &str, err: &ParseError) -> Result<()> {
    let kind = match err.kind() {
        ParseErrorKind::Lex => "lex",
        ParseErrorKind::Semantic => "semantic",
    };
    tracing::debug!(kind, position = err.position(), error = %err, "parse rejected");

    if json {
        output::print(&json!({
            "status": "error",
            "error": err.to_string(),
            "kind": kind,
            "position": err.position(),
        }));
    } else {
        let style = StyleOptions::detect();
        let boxed = box_header(
            format!("{} Parse Error", emoji("error", &style)),
            Some(color(Role::Error, err.to_string(), &style)),
            &style,
        );
        eprintln!("{boxed}");
        eprintln!("{}", caret_excerpt(input, err.position()));
        eprintln!(
            "{}",
            color(Role::Dim, "the saved configuration was not changed", &style)
        );
    }
    anyhow::bail!("cannot parse command: {err}")
}
