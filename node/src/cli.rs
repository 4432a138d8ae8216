//! # CLI Interface
//!
//! Defines the command-line argument structure for `nova-auth-node` using
//! `clap` derive. Four subcommands: `run`, `keygen`, `sign`, and `version`.
//!
//! `keygen` and `sign` exist so you can walk the whole login flow with
//! nothing but this binary and `curl`.

use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

use nova_auth::AuthConfig;

use crate::logging::LogFormat;

/// NOVA Auth node.
///
/// Serves DID registration, challenge issuance, login, and session checks
/// over REST and JSON-RPC, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "nova-auth-node",
    about = "NOVA DID authentication node",
    version,
    propagate_version = true
)]
pub struct NovaAuthCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the auth node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the auth server.
    Run(RunArgs),
    /// Generate an Ed25519 keypair and print its did:key, keys, and a DID
    /// document ready for registration.
    Keygen(KeygenArgs),
    /// Sign a challenge with a hex-encoded secret key and print the
    /// hex signature.
    Sign(SignArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Address to bind the API and metrics listeners to.
    #[arg(long, env = "NOVA_AUTH_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST and JSON-RPC API.
    #[arg(long, env = "NOVA_AUTH_PORT", default_value_t = 9750)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint. 0 disables it.
    #[arg(long, env = "NOVA_AUTH_METRICS_PORT", default_value_t = 9751)]
    pub metrics_port: u16,

    /// Session lifetime in seconds.
    #[arg(long, env = "NOVA_AUTH_SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// Seconds an unanswered challenge survives before the sweeper drops it.
    #[arg(long, env = "NOVA_AUTH_CHALLENGE_TTL_SECS", default_value_t = 600)]
    pub challenge_ttl_secs: u64,

    /// Seconds an expired session keeps reporting `isValid: false` before
    /// the sweeper forgets it.
    #[arg(long, env = "NOVA_AUTH_SESSION_RETENTION_SECS", default_value_t = 86_400)]
    pub session_retention_secs: u64,

    /// How often to sweep stale challenges and long-dead sessions, in
    /// seconds. 0 disables sweeping.
    #[arg(long, env = "NOVA_AUTH_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Accept any non-empty signature at login.
    ///
    /// **Development only.** Anyone who knows a registered DID can log in
    /// as it.
    #[arg(long, env = "NOVA_AUTH_INSECURE_ACCEPT_ANY_SIGNATURE")]
    pub insecure_accept_any_signature: bool,

    /// Log output format.
    #[arg(long, env = "NOVA_AUTH_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "NOVA_AUTH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl RunArgs {
    /// The service configuration these flags describe.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig::default()
            .with_session_ttl(Duration::from_secs(self.session_ttl_secs))
            .with_challenge_ttl(Duration::from_secs(self.challenge_ttl_secs))
            .with_session_retention(Duration::from_secs(self.session_retention_secs))
    }
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// DID to build the document for. Defaults to the key's own did:key.
    #[arg(long)]
    pub did: Option<String>,
}

/// Arguments for the `sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// Hex-encoded 32-byte Ed25519 secret key.
    #[arg(long, env = "NOVA_AUTH_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// The challenge string, exactly as the server returned it.
    #[arg(long)]
    pub challenge: String,
}

/// `--log-format` values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
