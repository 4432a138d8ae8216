//! # REST + JSON-RPC API
//!
//! Builds the axum router that exposes the auth node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                    | Description                        |
//! |--------|-------------------------|------------------------------------|
//! | GET    | `/health`               | Liveness probe                     |
//! | GET    | `/status`               | Version and store sizes            |
//! | POST   | `/dids`                 | Register a DID and its document    |
//! | GET    | `/dids/:did`            | Is this DID registered?            |
//! | POST   | `/dids/:did/challenge`  | Issue a login challenge            |
//! | POST   | `/login`                | Exchange a signature for a session |
//! | GET    | `/sessions/:token`      | Session validity and expiry        |
//! | DELETE | `/sessions/:token`      | Log out                            |
//! | POST   | `/rpc`                  | JSON-RPC 2.0 gateway               |
//!
//! ## Error Mapping
//!
//! | Error               | HTTP | JSON-RPC |
//! |---------------------|------|----------|
//! | `InvalidDid`        | 400  | -32010   |
//! | `AlreadyRegistered` | 409  | -32011   |
//! | `NotRegistered`     | 404  | -32012   |
//! | `NoChallengeIssued` | 409  | -32013   |
//! | `InvalidSignature`  | 401  | -32014   |

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nova_auth::{
    AuthError, AuthService, AuthStats, Challenge, DidStatus, LoginResult, RegistrationResult,
    SessionStatus, SweepReport,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The authentication state machine.
    pub service: Arc<AuthService>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// Both transports go through these, so metrics are recorded once per
// operation no matter how it arrived.
impl AppState {
    fn register_did(&self, did: &str, document: Value) -> Result<RegistrationResult, AuthError> {
        let _timer = self.metrics.request_latency_seconds.start_timer();
        let result = self.service.register_did(did, document)?;
        self.metrics.registrations_total.inc();
        Ok(result)
    }

    fn did_status(&self, did: &str) -> DidStatus {
        let _timer = self.metrics.request_latency_seconds.start_timer();
        self.service.did_status(did)
    }

    fn issue_challenge(&self, did: &str) -> Result<Challenge, AuthError> {
        let _timer = self.metrics.request_latency_seconds.start_timer();
        let challenge = self.service.issue_challenge(did)?;
        self.metrics.challenges_issued_total.inc();
        Ok(challenge)
    }

    fn login(&self, did: &str, signature: &str) -> Result<LoginResult, AuthError> {
        let _timer = self.metrics.request_latency_seconds.start_timer();
        match self.service.login(did, signature) {
            Ok(result) => {
                self.metrics.logins_total.inc();
                self.refresh_sessions_active();
                Ok(result)
            }
            Err(e) => {
                self.metrics.login_failures_total.inc();
                Err(e)
            }
        }
    }

    fn session_status(&self, token: &str) -> SessionStatus {
        let _timer = self.metrics.request_latency_seconds.start_timer();
        self.service.session_status(token)
    }

    fn revoke_session(&self, token: &str) -> bool {
        let _timer = self.metrics.request_latency_seconds.start_timer();
        let revoked = self.service.revoke_session(token);
        if revoked {
            self.refresh_sessions_active();
        }
        revoked
    }

    /// Recount unexpired sessions into the gauge.
    fn refresh_sessions_active(&self) {
        self.metrics
            .sessions_active
            .set(self.service.stats().active_sessions as i64);
    }

    /// Runs one sweep and refreshes the gauges. Called by the node's
    /// background loop.
    pub fn sweep(&self) -> SweepReport {
        let report = self.service.sweep();
        self.metrics
            .sweep_evictions_total
            .inc_by(report.total() as u64);
        self.refresh_sessions_active();
        report
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured API port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/dids", post(register_did_handler))
        .route("/dids/:did", get(did_status_handler))
        .route("/dids/:did/challenge", post(challenge_handler))
        .route("/login", post(login_handler))
        .route(
            "/sessions/:token",
            get(session_status_handler).delete(revoke_session_handler),
        )
        .route("/rpc", post(rpc_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Method parameters (positional or named).
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn invalid_params(expected: &str) -> Self {
        Self {
            code: -32602,
            message: format!("Invalid params: expected {}", expected),
            data: None,
        }
    }
}

impl From<&AuthError> for JsonRpcError {
    fn from(err: &AuthError) -> Self {
        let code = match err {
            AuthError::InvalidDid(_) => -32010,
            AuthError::AlreadyRegistered { .. } => -32011,
            AuthError::NotRegistered { .. } => -32012,
            AuthError::NoChallengeIssued { .. } => -32013,
            AuthError::InvalidSignature => -32014,
        };
        Self {
            code,
            message: err.to_string(),
            data: Some(serde_json::json!({ "kind": err.kind() })),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Request body for `POST /dids`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub did: String,
    pub document: Value,
}

/// Request body for `POST /login`.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub did: String,
    pub signature: String,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Store sizes.
    pub stats: AuthStats,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// An [`AuthError`] on its way out as an HTTP response.
pub struct ApiError(AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AuthError::InvalidDid(_) => StatusCode::BAD_REQUEST,
            AuthError::AlreadyRegistered { .. } => StatusCode::CONFLICT,
            AuthError::NotRegistered { .. } => StatusCode::NOT_FOUND,
            AuthError::NoChallengeIssued { .. } => StatusCode::CONFLICT,
            AuthError::InvalidSignature => StatusCode::UNAUTHORIZED,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().into(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
///
/// This is the liveness probe for orchestrators (k8s, systemd, etc.).
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — version and current store sizes.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        stats: state.service.stats(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /dids` — registers a DID. 201 on success, 409 if taken.
async fn register_did_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.register_did(&req.did, req.document)?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// `GET /dids/:did`
async fn did_status_handler(
    Path(did): Path<String>,
    State(state): State<AppState>,
) -> Json<DidStatus> {
    Json(state.did_status(&did))
}

/// `POST /dids/:did/challenge`
async fn challenge_handler(
    Path(did): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Challenge>, ApiError> {
    Ok(Json(state.issue_challenge(&did)?))
}

/// `POST /login` — 200 with a session token, or 401/404/409.
async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResult>, ApiError> {
    Ok(Json(state.login(&req.did, &req.signature)?))
}

/// `GET /sessions/:token` — always 200; unknown tokens report invalid.
async fn session_status_handler(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Json<SessionStatus> {
    Json(state.session_status(&token))
}

/// `DELETE /sessions/:token` — 204 if the session existed, 404 otherwise.
async fn revoke_session_handler(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> StatusCode {
    if state.revoke_session(&token) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
///
/// Params may be positional (`["did:example:1"]`) or named
/// (`{"did": "did:example:1"}`). Unknown methods return -32601.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: -32600,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    let params = req.params.as_ref();
    let outcome = match req.method.as_str() {
        "auth_registerDid" => {
            match (param_str(params, 0, "did"), param(params, 1, "document")) {
                (Some(did), Some(document)) => rpc_result(state.register_did(did, document.clone())),
                _ => Err(JsonRpcError::invalid_params("[did, document]")),
            }
        }
        "auth_getDidStatus" => match param_str(params, 0, "did") {
            Some(did) => rpc_value(state.did_status(did)),
            None => Err(JsonRpcError::invalid_params("[did]")),
        },
        "auth_getChallenge" => match param_str(params, 0, "did") {
            Some(did) => rpc_result(state.issue_challenge(did)),
            None => Err(JsonRpcError::invalid_params("[did]")),
        },
        "auth_login" => match (param_str(params, 0, "did"), param_str(params, 1, "signature")) {
            (Some(did), Some(signature)) => rpc_result(state.login(did, signature)),
            _ => Err(JsonRpcError::invalid_params("[did, signature]")),
        },
        "auth_getSessionStatus" => match param_str(params, 0, "token") {
            Some(token) => rpc_value(state.session_status(token)),
            None => Err(JsonRpcError::invalid_params("[token]")),
        },
        "auth_revokeSession" => match param_str(params, 0, "token") {
            Some(token) => Ok(Value::Bool(state.revoke_session(token))),
            None => Err(JsonRpcError::invalid_params("[token]")),
        },
        "auth_version" => Ok(Value::String(state.version.clone())),
        _ => Err(JsonRpcError {
            code: -32601,
            message: format!("Method not found: {}", req.method),
            data: None,
        }),
    };

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

/// Looks a parameter up by position in an array or by name in an object.
fn param<'a>(params: Option<&'a Value>, index: usize, name: &str) -> Option<&'a Value> {
    match params? {
        Value::Array(items) => items.get(index),
        Value::Object(fields) => fields.get(name),
        _ => None,
    }
}

fn param_str<'a>(params: Option<&'a Value>, index: usize, name: &str) -> Option<&'a str> {
    param(params, index, name).and_then(Value::as_str)
}

fn rpc_value<T: Serialize>(value: T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError {
        code: -32603,
        message: format!("Internal error: {}", e),
        data: None,
    })
}

fn rpc_result<T: Serialize>(result: Result<T, AuthError>) -> Result<Value, JsonRpcError> {
    match result {
        Ok(value) => rpc_value(value),
        Err(e) => Err(JsonRpcError::from(&e)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
