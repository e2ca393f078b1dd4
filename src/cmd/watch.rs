/*!
`watch.rs` - live editing session driven by lines on stdin.

Every line is one edit. Edits that change the pipeline are submitted to the preview
session, which reruns the tool once typing pauses for the debounce window and prints the
newest result. Successful previews are saved, so the next `show`/`run` sees them.

Edit language (indices are 1-based, keywords case-insensitive):

  verb add <text>          verb edit <n> <text>     verb rm|up|down|toggle <n>
  in <format>              out <format>             (csv, tsv, json, ndjson, pprint, auto)
  ragged [on|off]          headerless [on|off]      (no argument toggles)
  ifs <sep>                options [text]           (no text clears)
  file <path>              text [content]           append <line>     (\n and \t are unescaped)
  import <mlr command>     list     help     quit
*/

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::cmd::format::{Role, StyleOptions, box_header, color, emoji, indent_block};
use crate::cmd::parse::caret_excerpt;
use crate::cmd::shared::{AppContext, render_config};
use crate::command::parse_command;
use crate::config::{Configuration, InputFormat, InputMode, OutputFormat};
use crate::preview::{Edit, PreviewOutcome, PreviewSession, PreviewState};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Quiet period after the last edit before the preview reruns
    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub debounce_ms: u64,

    /// Lines sampled from the head of the input
    #[arg(long, value_name = "N")]
    pub lines: Option<usize>,
}

const HELP: &str = "\
verb add <text> | verb edit <n> <text> | verb rm|up|down|toggle <n>
in <format> | out <format> | ragged [on|off] | headerless [on|off] | ifs <sep> | options [text]
file <path> | text [content] | append <line> | import <mlr command> | list | help | quit";

/* ---- Edit Language ---- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    VerbAdd(String),
    VerbEdit(usize, String),
    VerbRemove(usize),
    VerbUp(usize),
    VerbDown(usize),
    VerbToggle(usize),
    InputFormat(InputFormat),
    OutputFormat(OutputFormat),
    Ragged(Option<bool>),
    Headerless(Option<bool>),
    Separator(String),
    Options(String),
    File(String),
    Text(String),
    Append(String),
    Import(String),
    List,
    Help,
    Quit,
}

/// First word and the trimmed remainder.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim()),
        None => (s, ""),
    }
}

/// 1-based index as typed -> 0-based.
fn index_arg(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n - 1),
        _ => Err(format!("expected a verb number (1, 2, ...), got '{raw}'")),
    }
}

fn switch_arg(raw: &str) -> Result<Option<bool>, String> {
    match raw.to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "on" | "true" | "yes" | "1" => Ok(Some(true)),
        "off" | "false" | "no" | "0" => Ok(Some(false)),
        other => Err(format!("expected on/off, got '{other}'")),
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("\\n", "\n").replace("\\t", "\t")
}

/// `Ok(None)` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Result<Option<WatchCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (keyword, rest) = split_word(line);

    let cmd = match keyword.to_ascii_lowercase().as_str() {
        "verb" | "v" => {
            let (action, rest) = split_word(rest);
            match action.to_ascii_lowercase().as_str() {
                "add" if !rest.is_empty() => WatchCommand::VerbAdd(rest.to_string()),
                "add" => return Err("verb add needs the verb text".into()),
                "edit" => {
                    let (n, text) = split_word(rest);
                    if text.is_empty() {
                        return Err("verb edit needs a number and the new text".into());
                    }
                    WatchCommand::VerbEdit(index_arg(n)?, text.to_string())
                }
                "rm" | "remove" => WatchCommand::VerbRemove(index_arg(rest)?),
                "up" => WatchCommand::VerbUp(index_arg(rest)?),
                "down" => WatchCommand::VerbDown(index_arg(rest)?),
                "toggle" => WatchCommand::VerbToggle(index_arg(rest)?),
                other => return Err(format!("unknown verb action '{other}'")),
            }
        }
        "in" => WatchCommand::InputFormat(
            InputFormat::from_str_ci(rest).ok_or_else(|| {
                let names: Vec<_> = InputFormat::variants().iter().map(|f| f.name()).collect();
                format!("unknown input format '{rest}' (one of: {})", names.join(", "))
            })?,
        ),
        "out" => WatchCommand::OutputFormat(
            OutputFormat::from_str_ci(rest).ok_or_else(|| {
                let names: Vec<_> = OutputFormat::variants().iter().map(|f| f.name()).collect();
                format!("unknown output format '{rest}' (one of: {})", names.join(", "))
            })?,
        ),
        "ragged" => WatchCommand::Ragged(switch_arg(rest)?),
        "headerless" => WatchCommand::Headerless(switch_arg(rest)?),
        "ifs" if !rest.is_empty() => WatchCommand::Separator(rest.to_string()),
        "ifs" => return Err("ifs needs a separator".into()),
        "options" => WatchCommand::Options(rest.to_string()),
        "file" if !rest.is_empty() => WatchCommand::File(rest.to_string()),
        "file" => return Err("file needs a path".into()),
        "text" => WatchCommand::Text(unescape(rest)),
        "append" => WatchCommand::Append(unescape(rest)),
        "import" if !rest.is_empty() => WatchCommand::Import(rest.to_string()),
        "import" => return Err("import needs a command line".into()),
        "list" | "ls" | "show" => WatchCommand::List,
        "help" | "?" => WatchCommand::Help,
        "quit" | "exit" | "q" => WatchCommand::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(cmd))
}

/* ---- Editor State ---- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Edited,
    List,
    Help,
    Quit,
}

/// Configuration plus pasted text, the two things a preview depends on.
#[derive(Debug, Clone, Default)]
pub struct Workbench {
    pub config: Configuration,
    pub text: String,
}

impl Workbench {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            text: String::new(),
        }
    }

    pub fn edit(&self) -> Edit {
        Edit::new(self.config.clone(), self.text.clone())
    }

    /// Applies one command. On error the workbench is unchanged.
    pub fn apply(&mut self, cmd: WatchCommand) -> Result<Effect, String> {
        let c = &self.config;
        let missing = |n: usize| format!("no verb #{}", n + 1);

        let next = match cmd {
            WatchCommand::List => return Ok(Effect::List),
            WatchCommand::Help => return Ok(Effect::Help),
            WatchCommand::Quit => return Ok(Effect::Quit),
            WatchCommand::Text(text) => {
                self.text = text;
                self.config = c.clone().with_input_mode(InputMode::Text);
                return Ok(Effect::Edited);
            }
            WatchCommand::Append(line) => {
                if !self.text.is_empty() && !self.text.ends_with('\n') {
                    self.text.push('\n');
                }
                self.text.push_str(&line);
                self.text.push('\n');
                self.config = c.clone().with_input_mode(InputMode::Text);
                return Ok(Effect::Edited);
            }

            WatchCommand::VerbAdd(text) => c.with_verb_added(&text).ok_or("verb text is empty")?,
            WatchCommand::VerbEdit(i, text) => c.with_verb_text(i, &text).ok_or_else(|| missing(i))?,
            WatchCommand::VerbRemove(i) => c.with_verb_removed(i).ok_or_else(|| missing(i))?,
            WatchCommand::VerbUp(i) => c
                .with_verb_moved_up(i)
                .ok_or_else(|| format!("verb #{} cannot move up", i + 1))?,
            WatchCommand::VerbDown(i) => c
                .with_verb_moved_down(i)
                .ok_or_else(|| format!("verb #{} cannot move down", i + 1))?,
            WatchCommand::VerbToggle(i) => c.with_verb_toggled(i).ok_or_else(|| missing(i))?,
            WatchCommand::InputFormat(f) => c.clone().with_input_format(f),
            WatchCommand::OutputFormat(f) => c.clone().with_output_format(f),
            WatchCommand::Ragged(v) => {
                let on = v.unwrap_or(!c.ragged);
                c.clone().with_ragged(on)
            }
            WatchCommand::Headerless(v) => {
                let on = v.unwrap_or(!c.headerless);
                c.clone().with_headerless(on)
            }
            WatchCommand::Separator(sep) => c.clone().with_field_separator(sep),
            WatchCommand::Options(text) => c.clone().with_options(text),
            WatchCommand::File(path) => c.clone().with_input_file(path),
            WatchCommand::Import(line) => parse_command(&line, c)
                .map_err(|e| format!("{e}\n{}", caret_excerpt(&line, e.position())))?,
        };

        self.config = next;
        Ok(Effect::Edited)
    }
}

/* ---- Session Loop ---- */

pub fn execute_watch(ctx: &AppContext, args: WatchArgs) -> Result<()> {
    let (config, _) = ctx.load_config()?;

    let mut settings = ctx.settings();
    settings.debounce = Duration::from_millis(args.debounce_ms);
    if let Some(n) = args.lines {
        settings.sample_lines = n;
    }

    let invoker = Arc::new(settings.invoker());
    let store = Arc::new(ctx.store());
    let rt = crate::cmd::shared::runtime()?;

    rt.block_on(async move {
        let style = StyleOptions::detect();
        let mut session = PreviewSession::spawn(invoker, store, settings);
        let printer = tokio::spawn(print_updates(session.subscribe(), style.clone()));

        let mut bench = Workbench::new(config);
        println!("{}", render_config(&bench.config, &style));
        println!("{}", color(Role::Dim, "type 'help' for the edit commands", &style));
        let mut last = session.submit(bench.edit())?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read standard input")?
        {
            let outcome = parse_line(&line).and_then(|cmd| match cmd {
                Some(cmd) => bench.apply(cmd).map(Some),
                None => Ok(None),
            });
            match outcome {
                Ok(Some(Effect::Edited)) => last = session.submit(bench.edit())?,
                Ok(Some(Effect::List)) => println!("{}", render_config(&bench.config, &style)),
                Ok(Some(Effect::Help)) => println!("{HELP}"),
                Ok(Some(Effect::Quit)) => break,
                Ok(None) => {}
                Err(msg) => eprintln!(
                    "{} {}",
                    emoji("warn", &style),
                    color(Role::Warning, msg, &style)
                ),
            }
        }

        // Let the newest edit finish so a piped script ends with its result.
        let _ = session.settled(last).await;
        session.shutdown().await;
        let _ = printer.await;
        Ok::<(), anyhow::Error>(())
    })
}

async fn print_updates(mut rx: watch::Receiver<PreviewState>, style: StyleOptions) {
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        match &state {
            PreviewState::Running { stamp } => eprintln!(
                "{} {}",
                emoji("clock", &style),
                color(Role::Dim, format!("running {stamp}…"), &style)
            ),
            PreviewState::Idle { .. } => println!(
                "{}",
                color(Role::Dim, "(idle: no input or no enabled verb)", &style)
            ),
            PreviewState::Displaying {
                outcome: PreviewOutcome::Success(s),
                ..
            } => {
                println!(
                    "{}",
                    box_header(
                        format!("{} {}", emoji("success", &style), s.command),
                        Some(s.format.name()),
                        &style
                    )
                );
                println!("{}", s.output.trim_end());
            }
            PreviewState::Displaying {
                outcome: PreviewOutcome::Failure { message, .. },
                ..
            } => println!(
                "{}",
                color(
                    Role::Error,
                    format!("{} preview failed\n{}", emoji("error", &style), indent_block(message, "  ")),
                    &style
                )
            ),
            PreviewState::Debouncing { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(bench: &mut Workbench, lines: &[&str]) {
        for line in lines {
            let cmd = parse_line(line).unwrap().unwrap();
            bench.apply(cmd).unwrap();
        }
    }

    #[test]
    fn parses_verb_commands_with_one_based_indices() {
        assert_eq!(
            parse_line("verb add sort -f a").unwrap(),
            Some(WatchCommand::VerbAdd("sort -f a".into()))
        );
        assert_eq!(parse_line("VERB rm 2").unwrap(), Some(WatchCommand::VerbRemove(1)));
        assert_eq!(
            parse_line("verb edit 1 head -n 3").unwrap(),
            Some(WatchCommand::VerbEdit(0, "head -n 3".into()))
        );
        assert!(parse_line("verb rm 0").is_err());
        assert!(parse_line("verb add").is_err());
        assert!(parse_line("verb fly 1").is_err());
    }

    #[test]
    fn parses_settings() {
        assert_eq!(
            parse_line("in --icsv").unwrap(),
            Some(WatchCommand::InputFormat(InputFormat::Csv))
        );
        assert_eq!(
            parse_line("out pprint").unwrap(),
            Some(WatchCommand::OutputFormat(OutputFormat::Pprint))
        );
        assert_eq!(parse_line("ragged").unwrap(), Some(WatchCommand::Ragged(None)));
        assert_eq!(
            parse_line("headerless off").unwrap(),
            Some(WatchCommand::Headerless(Some(false)))
        );
        assert_eq!(
            parse_line(r"text a,b\n1,2").unwrap(),
            Some(WatchCommand::Text("a,b\n1,2".into()))
        );
        assert!(parse_line("in xml").is_err());
        assert!(parse_line("frobnicate").is_err());
        assert_eq!(parse_line("  # comment").unwrap(), None);
        assert_eq!(parse_line("").unwrap(), None);
    }

    #[test]
    fn edits_build_the_pipeline() {
        let mut bench = Workbench::default();
        apply_all(
            &mut bench,
            &[
                "in csv",
                "out json",
                "ragged on",
                "verb add head -n 4",
                "verb add sort -f a",
                "verb up 2",
                "verb toggle 2",
                "append a,b",
                "append 1,2",
            ],
        );
        assert_eq!(crate::command::synthesize(&bench.config), "mlr --icsv --ragged --ojson sort -f a");
        assert_eq!(bench.config.verbs.len(), 2);
        assert_eq!(bench.text, "a,b\n1,2\n");
        assert!(bench.edit().has_input());
    }

    #[test]
    fn failed_edits_leave_state_alone() {
        let mut bench = Workbench::default();
        apply_all(&mut bench, &["verb add cat"]);
        let before = bench.config.clone();

        assert!(bench.apply(WatchCommand::VerbRemove(5)).is_err());
        assert!(bench.apply(WatchCommand::VerbUp(0)).is_err());
        let err = bench
            .apply(WatchCommand::Import("mlr --icsv --itsv cat".into()))
            .unwrap_err();
        assert!(err.contains("duplicate flag"));
        assert!(err.contains('^'));
        assert_eq!(bench.config, before);
    }

    #[test]
    fn import_replaces_pipeline_and_keeps_file() {
        let mut bench = Workbench::default();
        apply_all(&mut bench, &["file /tmp/in.csv", "verb add cat"]);
        apply_all(&mut bench, &["import mlr --c2p head -n 2 then put '$z = 1'"]);
        assert_eq!(bench.config.file_input(), Some("/tmp/in.csv"));
        assert_eq!(bench.config.input_format, InputFormat::Csv);
        assert_eq!(bench.config.output_format, OutputFormat::Pprint);
        assert_eq!(bench.config.verbs.len(), 2);
        assert_eq!(bench.config.verbs[1].text, "put '$z = 1'");
    }

    #[test]
    fn switches_toggle_without_argument() {
        let mut bench = Workbench::default();
        apply_all(&mut bench, &["headerless"]);
        assert!(bench.config.headerless);
        apply_all(&mut bench, &["headerless"]);
        assert!(!bench.config.headerless);
    }
}
