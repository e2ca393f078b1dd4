//! Configuration model: the structured form of "which mlr command to run".
//!
//! A `Configuration` is a plain value. Editors never patch it in place; every edit produces
//! a new value (`with_*` setters, verb list operations returning `Option<Configuration>`).
//! Validation is advisory: unknown formats mean "auto" and an empty field separator is
//! read back as `,` wherever it is used.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator the tool assumes for CSV input when `--ifs` is absent.
pub const DEFAULT_FIELD_SEPARATOR: &str = ",";

/* -------------------------------------------------------------------------- */
/* Input mode                                                                 */
/* -------------------------------------------------------------------------- */

/// Where the preview data comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputMode {
    /// Pasted text held by the sample source, fed on stdin.
    #[default]
    Text,
    /// A file on disk named by `input_path`.
    File,
}

impl InputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputMode::Text => "text",
            InputMode::File => "file",
        }
    }
}

impl From<String> for InputMode {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("file") {
            InputMode::File
        } else {
            InputMode::Text
        }
    }
}

impl From<InputMode> for String {
    fn from(mode: InputMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* -------------------------------------------------------------------------- */
/* Formats                                                                    */
/* -------------------------------------------------------------------------- */

/// Input record format. `Auto` leaves detection to the tool and emits no flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InputFormat {
    #[default]
    Auto,
    Csv,
    Tsv,
    Json,
    Ndjson,
}

impl InputFormat {
    pub const fn variants() -> &'static [InputFormat] {
        &[
            InputFormat::Auto,
            InputFormat::Csv,
            InputFormat::Tsv,
            InputFormat::Json,
            InputFormat::Ndjson,
        ]
    }

    /// The flag this format synthesizes to, if any.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            InputFormat::Auto => None,
            InputFormat::Csv => Some("--icsv"),
            InputFormat::Tsv => Some("--itsv"),
            InputFormat::Json => Some("--ijson"),
            InputFormat::Ndjson => Some("--ijsonl"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputFormat::Auto => "auto",
            InputFormat::Csv => "csv",
            InputFormat::Tsv => "tsv",
            InputFormat::Json => "json",
            InputFormat::Ndjson => "ndjson",
        }
    }

    /// Accepts a bare name (`csv`, `jsonl`) or the flag spelling (`--icsv`). Anything else is `None`.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase();
        let bare = norm.strip_prefix("--i").unwrap_or(&norm);
        match bare {
            "" | "auto" => Some(InputFormat::Auto),
            "csv" => Some(InputFormat::Csv),
            "tsv" => Some(InputFormat::Tsv),
            "json" => Some(InputFormat::Json),
            "ndjson" | "jsonl" => Some(InputFormat::Ndjson),
            _ => None,
        }
    }

    /// `--ragged` and `--headerless-csv-input` only mean something for these.
    pub fn is_delimited(&self) -> bool {
        matches!(self, InputFormat::Csv | InputFormat::Tsv)
    }
}

impl From<String> for InputFormat {
    fn from(raw: String) -> Self {
        InputFormat::from_str_ci(&raw).unwrap_or_default()
    }
}

impl From<InputFormat> for String {
    fn from(fmt: InputFormat) -> Self {
        fmt.flag().unwrap_or_default().to_string()
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output record format. `Auto` keeps the tool's default writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputFormat {
    #[default]
    Auto,
    Pprint,
    Csv,
    Tsv,
    Json,
    Ndjson,
}

impl OutputFormat {
    pub const fn variants() -> &'static [OutputFormat] {
        &[
            OutputFormat::Auto,
            OutputFormat::Pprint,
            OutputFormat::Csv,
            OutputFormat::Tsv,
            OutputFormat::Json,
            OutputFormat::Ndjson,
        ]
    }

    pub fn flag(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Auto => None,
            OutputFormat::Pprint => Some("--opprint"),
            OutputFormat::Csv => Some("--ocsv"),
            OutputFormat::Tsv => Some("--otsv"),
            OutputFormat::Json => Some("--ojson"),
            OutputFormat::Ndjson => Some("--ojsonl"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Auto => "auto",
            OutputFormat::Pprint => "pprint",
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
            OutputFormat::Ndjson => "ndjson",
        }
    }

    pub fn from_str_ci(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase();
        let bare = norm.strip_prefix("--o").unwrap_or(&norm);
        match bare {
            "" | "auto" => Some(OutputFormat::Auto),
            "pprint" => Some(OutputFormat::Pprint),
            "csv" => Some(OutputFormat::Csv),
            "tsv" => Some(OutputFormat::Tsv),
            "json" => Some(OutputFormat::Json),
            "ndjson" | "jsonl" => Some(OutputFormat::Ndjson),
            _ => None,
        }
    }
}

impl From<String> for OutputFormat {
    fn from(raw: String) -> Self {
        OutputFormat::from_str_ci(&raw).unwrap_or_default()
    }
}

impl From<OutputFormat> for String {
    fn from(fmt: OutputFormat) -> Self {
        fmt.flag().unwrap_or_default().to_string()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/* -------------------------------------------------------------------------- */
/* Verb steps                                                                 */
/* -------------------------------------------------------------------------- */

/// One pipeline stage, kept exactly as typed (quotes included).
///
/// Disabled steps stay in the list but never reach a command line, so a
/// command string cannot carry them back: parsing always yields enabled steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbStep {
    #[serde(rename = "value", alias = "text")]
    pub text: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl VerbStep {
    /// Trimmed, enabled step; `None` for blank text.
    pub fn new(text: impl AsRef<str>) -> Option<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            enabled: true,
        })
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/* -------------------------------------------------------------------------- */
/* Configuration                                                              */
/* -------------------------------------------------------------------------- */

/// The full pipeline state, persisted field-for-field by the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub input_path: String,
    pub input_mode: InputMode,
    pub input_format: InputFormat,
    pub ragged: bool,
    pub headerless: bool,
    pub field_separator: String,
    pub output_format: OutputFormat,
    pub verbs: Vec<VerbStep>,
    pub options: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            input_path: String::new(),
            input_mode: InputMode::Text,
            input_format: InputFormat::Auto,
            ragged: false,
            headerless: false,
            field_separator: DEFAULT_FIELD_SEPARATOR.to_string(),
            output_format: OutputFormat::Auto,
            verbs: Vec::new(),
            options: String::new(),
        }
    }
}

impl Configuration {
    /// Separator as the tool will see it; blank is read as the default.
    pub fn effective_separator(&self) -> &str {
        if self.field_separator.is_empty() {
            DEFAULT_FIELD_SEPARATOR
        } else {
            &self.field_separator
        }
    }

    pub fn enabled_verbs(&self) -> impl Iterator<Item = &VerbStep> {
        self.verbs.iter().filter(|v| v.enabled)
    }

    pub fn has_enabled_verbs(&self) -> bool {
        self.verbs.iter().any(|v| v.enabled)
    }

    /// The input file, when file mode is active and a path is set.
    pub fn file_input(&self) -> Option<&str> {
        match self.input_mode {
            InputMode::File if !self.input_path.trim().is_empty() => Some(self.input_path.as_str()),
            _ => None,
        }
    }

    /// Repairs values restored from disk: blank separator, blank or untrimmed verbs.
    pub fn normalized(mut self) -> Self {
        if self.field_separator.is_empty() {
            self.field_separator = DEFAULT_FIELD_SEPARATOR.to_string();
        }
        self.verbs = self
            .verbs
            .into_iter()
            .filter_map(|v| {
                let enabled = v.enabled;
                VerbStep::new(&v.text).map(|mut step| {
                    step.enabled = enabled;
                    step
                })
            })
            .collect();
        self
    }

    /* ---- Field setters ---- */

    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    /// Switches to file mode reading `path`.
    pub fn with_input_file(mut self, path: impl Into<String>) -> Self {
        self.input_mode = InputMode::File;
        self.input_path = path.into();
        self
    }

    pub fn with_input_format(mut self, format: InputFormat) -> Self {
        self.input_format = format;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_ragged(mut self, ragged: bool) -> Self {
        self.ragged = ragged;
        self
    }

    pub fn with_headerless(mut self, headerless: bool) -> Self {
        self.headerless = headerless;
        self
    }

    pub fn with_field_separator(mut self, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        self.field_separator = if separator.is_empty() {
            DEFAULT_FIELD_SEPARATOR.to_string()
        } else {
            separator
        };
        self
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into().trim().to_string();
        self
    }

    pub fn with_verbs(mut self, verbs: Vec<VerbStep>) -> Self {
        self.verbs = verbs;
        self
    }

    /* ---- Verb list edits ---- */

    /// Appends an enabled step. `None` when `text` is blank.
    pub fn with_verb_added(&self, text: &str) -> Option<Self> {
        let step = VerbStep::new(text)?;
        let mut next = self.clone();
        next.verbs.push(step);
        Some(next)
    }

    pub fn with_verb_removed(&self, index: usize) -> Option<Self> {
        if index >= self.verbs.len() {
            return None;
        }
        let mut next = self.clone();
        next.verbs.remove(index);
        Some(next)
    }

    /// Swaps the step with its predecessor.
    pub fn with_verb_moved_up(&self, index: usize) -> Option<Self> {
        if index == 0 || index >= self.verbs.len() {
            return None;
        }
        let mut next = self.clone();
        next.verbs.swap(index, index - 1);
        Some(next)
    }

    /// Swaps the step with its successor.
    pub fn with_verb_moved_down(&self, index: usize) -> Option<Self> {
        if index + 1 >= self.verbs.len() {
            return None;
        }
        let mut next = self.clone();
        next.verbs.swap(index, index + 1);
        Some(next)
    }

    pub fn with_verb_toggled(&self, index: usize) -> Option<Self> {
        let mut next = self.clone();
        let step = next.verbs.get_mut(index)?;
        step.enabled = !step.enabled;
        Some(next)
    }

    /// Replaces a step's text, keeping its enabled flag.
    pub fn with_verb_text(&self, index: usize, text: &str) -> Option<Self> {
        let replacement = VerbStep::new(text)?;
        let mut next = self.clone();
        let step = next.verbs.get_mut(index)?;
        step.text = replacement.text;
        Some(next)
    }
}
