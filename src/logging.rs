//! Structured logging for sync runs.
//!
//! The core reports what it does through the [`SyncLogger`] trait: four
//! levels, each taking a message and a free-form field map. Library callers
//! that don't care get [`NoopLogger`]; the `ctxsync` binary uses
//! [`TracingLogger`], which forwards to `tracing` and is printed on **stderr**
//! so stdout remains parseable for scripts.

use serde_json::{Map, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Free-form metadata attached to a log line.
pub type LogFields = Map<String, Value>;

/// Build [`LogFields`] from a `serde_json::json!({...})` object.
///
/// Non-object values end up under a single `"value"` key.
pub fn fields(value: Value) -> LogFields {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Pluggable structured logger.
pub trait SyncLogger: Send + Sync {
    fn info(&self, message: &str, fields: &LogFields);
    fn warn(&self, message: &str, fields: &LogFields);
    fn error(&self, message: &str, fields: &LogFields);
    fn debug(&self, message: &str, fields: &LogFields);
}

/// Discards everything. The default logger.
pub struct NoopLogger;

impl SyncLogger for NoopLogger {
    fn info(&self, _message: &str, _fields: &LogFields) {}
    fn warn(&self, _message: &str, _fields: &LogFields) {}
    fn error(&self, _message: &str, _fields: &LogFields) {}
    fn debug(&self, _message: &str, _fields: &LogFields) {}
}

/// Forwards to the `tracing` macros with the field map rendered as JSON.
pub struct TracingLogger;

fn render(fields: &LogFields) -> String {
    if fields.is_empty() {
        return String::new();
    }
    Value::Object(fields.clone()).to_string()
}

impl SyncLogger for TracingLogger {
    fn info(&self, message: &str, fields: &LogFields) {
        tracing::info!(fields = %render(fields), "{}", message);
    }

    fn warn(&self, message: &str, fields: &LogFields) {
        tracing::warn!(fields = %render(fields), "{}", message);
    }

    fn error(&self, message: &str, fields: &LogFields) {
        tracing::error!(fields = %render(fields), "{}", message);
    }

    fn debug(&self, message: &str, fields: &LogFields) {
        tracing::debug!(fields = %render(fields), "{}", message);
    }
}

/// Install the global `tracing` subscriber for the CLI.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` when
/// `verbose` is true. Colour is only enabled when stderr is a TTY.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    Ok(())
}
