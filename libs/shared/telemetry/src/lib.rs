//! Structured logging bootstrap shared by every binary in the workspace.
//!
//! A worker task that panics mid-fleet should not silently vanish from the
//! operator's log stream, so [`init`] also installs a panic hook that
//! routes the panic payload and location through the same subscriber
//! before the default hook runs.

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Output rendering chosen for the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored when writing to a terminal.
    Compact,
    /// One JSON object per line, for ingestion by a log pipeline.
    Json,
}

impl LogFormat {
    /// Reads `XIEBO_LOG_FORMAT`; defaults to `Compact` on a TTY and `Json`
    /// otherwise, since a non-interactive stdout is usually a pipe into
    /// something that wants structured lines.
    pub fn from_env() -> Self {
        match std::env::var("XIEBO_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ if atty_stdout() => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

fn atty_stdout() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal()
}

/// Installs the global `tracing` subscriber and panic hook. Safe to call
/// more than once; only the first call takes effect.
pub fn init(service_name: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("XIEBO_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        match LogFormat::from_env() {
            LogFormat::Json => {
                let subscriber = fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_target(true)
                    .with_current_span(false)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
            LogFormat::Compact => {
                let subscriber = fmt()
                    .compact()
                    .with_env_filter(filter)
                    .with_target(false)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        }

        install_panic_hook();
        tracing::info!(service = service_name, "telemetry initialized");
    });
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());
        tracing::error!(location = %location, message = %payload, "panic in worker fleet");
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("telemetry-test");
        init("telemetry-test");
    }
}
