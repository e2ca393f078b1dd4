//! Live preview: bounded samples, tool invocation, and the debounced orchestrator.

pub mod invoker;
pub mod sample;
pub mod session;

use std::time::Duration;

pub use invoker::{InvocationRequest, MillerInvoker, Payload, ToolInvoker, ToolOutput};
pub use session::{Edit, EditStamp, PreviewOutcome, PreviewSession, PreviewState, PreviewSuccess};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_SAMPLE_LINES: usize = 100;
pub const DEFAULT_MAX_TEXT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for the preview loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSettings {
    /// Executable to run (`mlr` on PATH by default).
    pub program: String,
    /// Quiet period after the last edit before the tool runs.
    pub debounce: Duration,
    /// Lines read from the head of an input file.
    pub sample_lines: usize,
    /// Cap on pasted text fed to the tool.
    pub max_text_bytes: usize,
    /// Per-invocation wall clock limit.
    pub timeout: Duration,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            program: crate::command::TOOL_NAME.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            sample_lines: DEFAULT_SAMPLE_LINES,
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PreviewSettings {
    pub fn invoker(&self) -> MillerInvoker {
        MillerInvoker::new(self.program.clone(), self.timeout)
    }
}
