//! Configuration -> command line.
//!
//! Word order is fixed: tool, input format, ragged, headerless, separator, output format,
//! free-text options, enabled verbs joined by `then`, and the input file last.

use std::borrow::Cow;

use super::{CONNECTIVE, HEADERLESS_FLAG, RAGGED_FLAG, SEPARATOR_FLAG, TOOL_NAME};
use crate::config::{Configuration, DEFAULT_FIELD_SEPARATOR, InputFormat};
use crate::error::SynthError;

/// Global flags in emission order, each with its optional value (unquoted).
fn leading_flags(config: &Configuration) -> Vec<(&'static str, Option<&str>)> {
    let mut flags = Vec::new();

    if let Some(flag) = config.input_format.flag() {
        flags.push((flag, None));
    }
    if config.input_format.is_delimited() {
        if config.ragged {
            flags.push((RAGGED_FLAG, None));
        }
        if config.headerless {
            flags.push((HEADERLESS_FLAG, None));
        }
    }
    let separator = config.effective_separator();
    if config.input_format == InputFormat::Csv && separator != DEFAULT_FIELD_SEPARATOR {
        flags.push((SEPARATOR_FLAG, Some(separator)));
    }
    if let Some(flag) = config.output_format.flag() {
        flags.push((flag, None));
    }
    flags
}

/// Renders the command line a user would type. Pure and total.
///
/// Verb text and options are inserted verbatim; only the separator value and the input
/// path are quoted, and only when the shell would otherwise split or expand them.
pub fn synthesize(config: &Configuration) -> String {
    if !config.has_enabled_verbs() {
        return String::new();
    }

    let mut words: Vec<Cow<'_, str>> = vec![Cow::Borrowed(TOOL_NAME)];

    for (flag, value) in leading_flags(config) {
        words.push(Cow::Borrowed(flag));
        if let Some(v) = value {
            words.push(shell_words::quote(v));
        }
    }

    let options = config.options.trim();
    if !options.is_empty() {
        words.push(Cow::Borrowed(options));
    }

    for (i, verb) in config.enabled_verbs().enumerate() {
        if i > 0 {
            words.push(Cow::Borrowed(CONNECTIVE));
        }
        words.push(Cow::Borrowed(verb.text.trim()));
    }

    if let Some(path) = config.file_input() {
        words.push(shell_words::quote(path));
    }

    words.join(" ")
}

/// Argument vector for executing the pipeline (tool name and input file excluded).
///
/// Options and verb texts are split with shell rules here; text the shell could not split
/// (for example an unbalanced quote typed into a verb) is reported instead of guessed at.
pub fn build_args(config: &Configuration) -> Result<Vec<String>, SynthError> {
    let mut args = Vec::new();

    for (flag, value) in leading_flags(config) {
        args.push(flag.to_string());
        if let Some(v) = value {
            args.push(v.to_string());
        }
    }

    let options = config.options.trim();
    if !options.is_empty() {
        args.extend(split_words("options", options)?);
    }

    for (i, verb) in config.enabled_verbs().enumerate() {
        if i > 0 {
            args.push(CONNECTIVE.to_string());
        }
        args.extend(split_words("verb", &verb.text)?);
    }

    Ok(args)
}

fn split_words(what: &'static str, text: &str) -> Result<Vec<String>, SynthError> {
    shell_words::split(text).map_err(|e| SynthError {
        what,
        text: text.to_string(),
        reason: e.to_string(),
    })
}
