//! Utilities: tracing setup (verbosity-derived filter, optional JSON log file), panic hook,
//! and the `{"status": ...}` envelopes used by `--json` output.
//!
//! Key items:
//!   init_logging / derive_level / install_panic_hook
//!   output::ok / output::error / output::print

/// Logging helpers.
pub mod logging {
    use std::panic;
    use std::path::Path;

    use anyhow::{Context, Result};
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::{EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

    /// File name prefix of the rolling JSON log.
    pub const LOG_FILE_PREFIX: &str = "mlr-workbench.log";

    /// `-q` wins over `-v`; no flag means `info`.
    pub fn derive_level(verbose: u8, quiet: bool) -> LevelFilter {
        if quiet {
            return LevelFilter::ERROR;
        }
        match verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn filter_for(level: LevelFilter) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()))
    }

    /// Installs the global subscriber: a stderr layer, plus a daily-rolling JSON file when
    /// `log_dir` is given. Keep the returned guard alive until exit so the file is flushed.
    pub fn init_logging(level: LevelFilter, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter_for(level));

        let mut guard = None;
        let file_layer = match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, worker) = tracing_appender::non_blocking(appender);
                guard = Some(worker);
                Some(
                    fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(filter_for(level)),
                )
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        Ok(guard)
    }

    /// Routes panics through `tracing` (target `telemetry`) before the default hook prints them.
    pub fn install_panic_hook() {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let payload = info.payload();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic payload>".to_string());
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_default();
            tracing::error!(target: "telemetry", %location, %message, "panic");
            default_hook(info);
        }));
    }

}

pub use logging::{derive_level, init_logging, install_panic_hook};

/// JSON envelopes for machine output.
pub mod output {
    use serde_json::{Map, Value, json};

    /// `{"status": "ok", ...fields}`; a non-object body lands under `data`.
    pub fn ok(body: Value) -> Value {
        let mut map = match body {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        map.insert("status".to_string(), Value::from("ok"));
        Value::Object(map)
    }

    pub fn error(message: impl AsRef<str>) -> Value {
        json!({ "status": "error", "error": message.as_ref() })
    }

    /// Pretty-prints to stdout.
    pub fn print(value: &Value) {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{s}"),
            Err(_) => println!("{value}"),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn ok_merges_status_into_object() {
            let v = ok(json!({ "command": "mlr cat" }));
            assert_eq!(v["status"], "ok");
            assert_eq!(v["command"], "mlr cat");
            let wrapped = ok(json!([1, 2]));
            assert_eq!(wrapped["data"][1], 2);
        }

        #[test]
        fn error_envelope() {
            let v = error("boom");
            assert_eq!(v["status"], "error");
            assert_eq!(v["error"], "boom");
        }
    }
}
