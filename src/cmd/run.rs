/*!
`run.rs` - execute the saved pipeline on the whole input.

Unlike `preview`, nothing is sampled: a file input is handed to the tool by path, and
pasted input (text mode) is read from standard input in full. Output goes to stdout or,
with `--output`, to a file.
*/

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;

use crate::cmd::format::{Role, StyleOptions, color, emoji};
use crate::cmd::shared::{AppContext, output_error, read_stdin};
use crate::command::{build_args, synthesize};
use crate::error::PreviewError;
use crate::preview::{InvocationRequest, MillerInvoker, Payload, ToolInvoker};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run against this file instead of the saved input
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Write the tool's output here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS", default_value_t = 600)]
    pub timeout: u64,
}

pub fn execute_run(ctx: &AppContext, args: RunArgs) -> Result<()> {
    let (mut config, _) = ctx.load_config()?;
    if let Some(path) = &args.input {
        config = config.with_input_file(path.display().to_string());
    }

    if !config.has_enabled_verbs() {
        return output_error(false, "Run Error", "the pipeline has no enabled verbs");
    }

    let argv = build_args(&config).map_err(PreviewError::from)?;
    let payload = match config.file_input() {
        Some(path) => Payload::File(PathBuf::from(path)),
        None => Payload::Stdin(read_stdin()?),
    };

    tracing::info!(command = %synthesize(&config), "running pipeline");
    let invoker = MillerInvoker::new(ctx.program.clone(), Duration::from_secs(args.timeout));
    let request = InvocationRequest {
        args: argv,
        payload,
        output_format: config.output_format,
    };

    let started = Instant::now();
    let rt = crate::cmd::shared::runtime()?;
    let out = rt
        .block_on(invoker.invoke(request))
        .map_err(PreviewError::from)
        .with_context(|| format!("Failed to run '{}'", invoker.program()))?;
    let elapsed_ms = started.elapsed().as_millis();

    if out.status != Some(0) {
        let err = PreviewError::Tool {
            status: out.status,
            stderr: out.stderr,
        };
        return output_error(false, "Run Failed", &err.to_string());
    }
    // A clean exit with warnings still produced output; pass the warnings through.
    if !out.stderr.trim().is_empty() {
        eprint!("{}", out.stderr);
    }

    match &args.output {
        Some(path) => {
            std::fs::write(path, &out.stdout)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            let style = StyleOptions::detect();
            eprintln!(
                "{} {}",
                emoji("success", &style),
                color(
                    Role::Success,
                    format!("wrote {} bytes to {} in {elapsed_ms} ms", out.stdout.len(), path.display()),
                    &style
                )
            );
        }
        None => print!("{}", out.stdout),
    }
    Ok(())
}
