//! # Prometheus Metrics
//!
//! Exposes operational metrics for the auth node. Scraped by Prometheus at
//! the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers and the sweeper task.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// DIDs successfully registered.
    pub registrations_total: IntCounter,
    /// Challenges handed out.
    pub challenges_issued_total: IntCounter,
    /// Successful logins (sessions opened).
    pub logins_total: IntCounter,
    /// Rejected login attempts, whatever the reason.
    pub login_failures_total: IntCounter,
    /// Unexpired sessions, recounted after each login, logout, and sweep.
    pub sessions_active: IntGauge,
    /// Challenges and sessions removed by the sweeper.
    pub sweep_evictions_total: IntCounter,
    /// Auth request handling latency in seconds.
    pub request_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("nova_auth".into()), None)?;

        let registrations_total =
            IntCounter::new("registrations_total", "Total number of DIDs registered")?;
        registry.register(Box::new(registrations_total.clone()))?;

        let challenges_issued_total =
            IntCounter::new("challenges_issued_total", "Total number of challenges issued")?;
        registry.register(Box::new(challenges_issued_total.clone()))?;

        let logins_total = IntCounter::new("logins_total", "Total number of successful logins")?;
        registry.register(Box::new(logins_total.clone()))?;

        let login_failures_total =
            IntCounter::new("login_failures_total", "Total number of rejected logins")?;
        registry.register(Box::new(login_failures_total.clone()))?;

        let sessions_active = IntGauge::new(
            "sessions_active",
            "Number of unexpired sessions",
        )?;
        registry.register(Box::new(sessions_active.clone()))?;

        let sweep_evictions_total = IntCounter::new(
            "sweep_evictions_total",
            "Total number of stale challenges and sessions evicted",
        )?;
        registry.register(Box::new(sweep_evictions_total.clone()))?;

        let request_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "request_latency_seconds",
                "Auth request handling latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(request_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            challenges_issued_total,
            logins_total,
            login_failures_total,
            sessions_active,
            sweep_evictions_total,
            request_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
