//! Bidirectional mapping between a `Configuration` and an `mlr` command line.
//!
//! synthesize(config) -> String      (total; empty when no verb is enabled)
//! build_args(config) -> argv        (what the preview actually executes)
//! parse_command(text, current) -> Configuration | ParseError

pub mod lexer;
pub mod parse;
pub mod synth;

pub use parse::parse_command;
pub use synth::{build_args, synthesize};

/// Display name of the tool; always the first word of a synthesized command.
pub const TOOL_NAME: &str = "mlr";

/// Word that chains pipeline stages.
pub const CONNECTIVE: &str = "then";

pub const RAGGED_FLAG: &str = "--ragged";
pub const HEADERLESS_FLAG: &str = "--headerless-csv-input";
pub const SEPARATOR_FLAG: &str = "--ifs";
