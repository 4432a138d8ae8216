// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Auth Node
//!
//! Entry point for the `nova-auth-node` binary. Parses CLI arguments,
//! initializes logging and metrics, starts the sweeper, and serves the
//! REST/JSON-RPC API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the auth server
//! - `keygen`  — generate a keypair and a DID document for it
//! - `sign`    — sign a challenge with a secret key
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use nova_auth::did::did_key_for;
use nova_auth::{AuthKeypair, AuthService, DidDocument, PermissiveVerifier};

use cli::{Commands, NovaAuthCli};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NovaAuthCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::Sign(args) => sign(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the auth node: API server, metrics endpoint, and sweeper.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(&args.log_level, args.log_format.into());

    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        session_ttl_secs = args.session_ttl_secs,
        session_retention_secs = args.session_retention_secs,
        sweep_interval_secs = args.sweep_interval_secs,
        "starting nova-auth-node"
    );

    // --- Auth service ---
    let mut service = AuthService::new(args.auth_config());
    if args.insecure_accept_any_signature {
        tracing::warn!("signature verification DISABLED: any non-empty signature logs in");
        service = service.with_verifier(PermissiveVerifier);
    }

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (auth protocol {})",
            env!("CARGO_PKG_VERSION"),
            nova_auth::config::AUTH_PROTOCOL_VERSION,
        ),
        service: Arc::new(service),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state.clone());
    let api_addr = format!("{}:{}", args.bind, args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("REST/RPC server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_task = if args.metrics_port != 0 {
        let metrics_router = axum::Router::new()
            .route("/metrics", axum::routing::get(metrics::metrics_handler))
            .with_state(Arc::clone(&node_metrics));
        let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
        let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
            .await
            .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
        tracing::info!("Metrics server listening on {}", metrics_addr);

        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, metrics_router).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // --- Sweeper ---
    let sweep_task = if args.sweep_interval_secs != 0 {
        let state = app_state.clone();
        let period = Duration::from_secs(args.sweep_interval_secs);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let report = state.sweep();
                tracing::debug!(
                    challenges = report.challenges_removed,
                    sessions = report.sessions_removed,
                    "sweep complete"
                );
            }
        }))
    } else {
        tracing::warn!("sweeping disabled; stale challenges and sessions accumulate");
        None
    };

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    for task in [sweep_task, metrics_task].into_iter().flatten() {
        task.abort();
    }
    tracing::info!("nova-auth-node stopped");
    Ok(())
}

/// Prints a fresh keypair, its did:key, and a DID document as JSON.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = AuthKeypair::generate();
    let public_key = keypair.public_key();
    let did = args.did.unwrap_or_else(|| did_key_for(&public_key));

    let document = DidDocument::for_ed25519_key(&did, &public_key);
    document
        .validate()
        .with_context(|| format!("generated document for {} is invalid", did))?;

    let output = serde_json::json!({
        "did": did,
        "publicKeyMultibase": public_key.to_multibase(),
        "publicKeyHex": public_key.to_hex(),
        "secretKeyHex": keypair.secret_key_hex(),
        "document": document.to_value().context("failed to serialize DID document")?,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed to render keygen output")?
    );
    Ok(())
}

/// Signs a challenge and prints the hex signature.
fn sign(args: cli::SignArgs) -> Result<()> {
    let keypair = AuthKeypair::from_hex(args.secret_key.trim()).context("invalid secret key")?;
    println!("{}", keypair.sign_challenge(&args.challenge));
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("nova-auth-node {}", env!("CARGO_PKG_VERSION"));
    println!("auth protocol  {}", nova_auth::config::AUTH_PROTOCOL_VERSION);
    println!("rustc          {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never completes and the other one decides.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
