//! Error taxonomy shared by the command engine, the preview orchestrator and the state store.
//!
//! Parsing failures (`LexError`, `ParseError`) never touch the caller's configuration.
//! Preview failures (`PreviewError`) abort one preview cycle only. `TransportError` is the
//! one class escalated to telemetry.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Tokenizer failure on a pasted command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated {quote} quote starting at byte {position}")]
    UnterminatedQuote { quote: char, position: usize },
}

impl LexError {
    pub fn position(&self) -> usize {
        match self {
            LexError::UnterminatedQuote { position, .. } => *position,
        }
    }
}

/// Coarse classification of a parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Lex,
    Semantic,
}

/// Failure to turn a command line into a `Configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("duplicate flag '{flag}' at byte {position} ({slot} already set by '{previous}')")]
    DuplicateFlag {
        flag: String,
        previous: String,
        slot: &'static str,
        position: usize,
    },

    #[error("flag '{flag}' at byte {position} expects a value")]
    MissingValue { flag: String, position: usize },

    #[error("empty pipeline stage next to 'then' at byte {position}")]
    EmptyStage { position: usize },
}

impl ParseError {
    pub fn kind(&self) -> ParseErrorKind {
        match self {
            ParseError::Lex(_) => ParseErrorKind::Lex,
            _ => ParseErrorKind::Semantic,
        }
    }

    /// Byte offset of the offending token in the parsed input.
    pub fn position(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.position(),
            ParseError::DuplicateFlag { position, .. }
            | ParseError::MissingValue { position, .. }
            | ParseError::EmptyStage { position } => *position,
        }
    }
}

/// A verb or options text that cannot be split into argv words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot split {what} '{text}' into arguments: {reason}")]
pub struct SynthError {
    pub what: &'static str,
    pub text: String,
    pub reason: String,
}

/// The external tool could not be run at all.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("tool '{program}' not found (is it installed and on PATH?)")]
    NotFound { program: String },

    #[error("failed to start '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("i/o error while talking to '{program}'")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single preview cycle failed.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("cannot read sample from {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", tool_message(*status, stderr))]
    Tool { status: Option<i32>, stderr: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Synthesis(#[from] SynthError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PreviewError {
    /// Transport failures are the only ones escalated to process-level telemetry.
    pub fn is_transport(&self) -> bool {
        matches!(self, PreviewError::Transport(_))
    }
}

fn tool_message(status: Option<i32>, stderr: &str) -> String {
    let stderr = stderr.trim();
    match (status, stderr.is_empty()) {
        (Some(code), true) => format!("mlr exited with status {code}"),
        (Some(0), false) => format!("mlr reported: {stderr}"),
        (Some(code), false) => format!("mlr exited with status {code}: {stderr}"),
        (None, true) => "mlr was terminated by a signal".to_string(),
        (None, false) => format!("mlr was terminated by a signal: {stderr}"),
    }
}

/// State store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no saved state at {}", .0.display())]
    NotFound(PathBuf),

    #[error("i/o error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON state in {}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid YAML state in {}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
