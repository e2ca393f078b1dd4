/*!
invoker.rs - running the external tool.

`ToolInvoker` is the seam between the preview orchestrator and the process
world; tests substitute a scripted fake. `MillerInvoker` spawns the real
binary with tokio, feeds the sample on stdin (or names the file), and
collects stdout/stderr/exit status under a timeout.
*/

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::OutputFormat;
use crate::error::TransportError;

/* ---- Request / Response ---- */

/// What the tool reads its records from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Written to the child's stdin, which is then closed.
    Stdin(String),
    /// Appended as the last argument.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    /// Arguments after the program name (see `command::build_args`).
    pub args: Vec<String>,
    pub payload: Payload,
    /// Output format the arguments select; used to label what comes back.
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
}

impl ToolOutput {
    /// Zero exit status and nothing but whitespace on stderr.
    pub fn is_clean(&self) -> bool {
        self.status == Some(0) && self.stderr.trim().is_empty()
    }
}

/* ---- Invoker Trait ---- */

pub trait ToolInvoker: Send + Sync + 'static {
    /// Runs the tool once. Only failures to run it at all are errors; a non-zero exit
    /// comes back as a `ToolOutput`.
    fn invoke(
        &self,
        request: InvocationRequest,
    ) -> impl Future<Output = Result<ToolOutput, TransportError>> + Send;
}

/* ---- Process-backed Invoker ---- */

#[derive(Debug, Clone)]
pub struct MillerInvoker {
    program: String,
    timeout: Duration,
}

impl MillerInvoker {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ToolInvoker for MillerInvoker {
    fn invoke(
        &self,
        request: InvocationRequest,
    ) -> impl Future<Output = Result<ToolOutput, TransportError>> + Send {
        let program = self.program.clone();
        let timeout = self.timeout;
        async move { run_child(program, timeout, request).await }
    }
}

async fn run_child(
    program: String,
    timeout: Duration,
    request: InvocationRequest,
) -> Result<ToolOutput, TransportError> {
    let mut cmd = Command::new(&program);
    cmd.args(&request.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // Dropping the wait future (timeout, aborted preview) must not leak the child.
        .kill_on_drop(true);

    let stdin_text = match request.payload {
        Payload::Stdin(text) => {
            cmd.stdin(Stdio::piped());
            Some(text)
        }
        Payload::File(path) => {
            cmd.arg(path);
            cmd.stdin(Stdio::null());
            None
        }
    };

    tracing::debug!(
        program = %program,
        args = ?request.args,
        output = %request.output_format,
        "spawning tool"
    );

    let mut child = cmd.spawn().map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            TransportError::NotFound {
                program: program.clone(),
            }
        } else {
            TransportError::Spawn {
                program: program.clone(),
                source,
            }
        }
    })?;

    if let Some(text) = stdin_text
        && let Some(mut stdin) = child.stdin.take()
    {
        // Separate task so a full stdout pipe cannot deadlock the write.
        tokio::spawn(async move {
            // The tool may exit before consuming everything (e.g. `head`); a broken pipe is fine.
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                tracing::trace!(error = %e, "stdin closed early");
            }
        });
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| TransportError::Timeout {
            program: program.clone(),
            timeout,
        })?
        .map_err(|source| TransportError::Io {
            program: program.clone(),
            source,
        })?;

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: output.status.code(),
    })
}
