//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with configurable format (JSON or
//! pretty-printed) and environment-based filtering via `RUST_LOG`.
//!
//! All log output is written to stderr so that stdout stays clean for the
//! `keygen` and `sign` subcommands, whose output is meant to be piped.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How `run` renders its log lines (`--log-format`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One colored line per event, with source file and line.
    Pretty,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Installs the node's subscriber. `run` calls it once before serving;
/// `keygen` and `sign` never log.
///
/// `default_level` comes from `--log-level` / `NOVA_AUTH_LOG_LEVEL` and is
/// ignored when `RUST_LOG` is set. Login failures are logged at `warn`, and
/// skipped verification methods at `debug` under the `nova_auth` target:
///
/// ```text
/// RUST_LOG=nova_auth=debug,nova_auth_node=info
/// ```
pub fn init_logging(default_level: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(true),
                )
                .init();
        }
    }

    tracing::info!("logging initialized (format={:?})", format);
}
