//! Request results and stored records for the authentication flow.
//!
//! Everything here serializes with camelCase field names and Unix
//! millisecond timestamps, which is what browser clients expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status string carried by successful mutating operations.
pub const STATUS_SUCCESS: &str = "success";

/// Result of a successful [`register_did`](crate::AuthService::register_did).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    /// Always `"success"`.
    pub status: String,
    /// Human-readable confirmation, e.g. `DID did:example:1 registered`.
    pub message: String,
    /// The document as stored.
    pub did_document: Value,
}

/// Result of [`did_status`](crate::AuthService::did_status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidStatus {
    pub is_registered: bool,
}

/// A freshly issued challenge, to be signed out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge: String,
}

/// Result of a successful [`login`](crate::AuthService::login).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    /// Always `"success"`.
    pub status: String,
    /// Opaque bearer token identifying the new session.
    pub token: String,
    /// When the session stops being valid.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires: DateTime<Utc>,
}

/// Result of [`session_status`](crate::AuthService::session_status).
///
/// `expires` is absent for unknown tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_valid: bool,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<DateTime<Utc>>,
}

impl SessionStatus {
    /// The answer for a token nobody has heard of.
    pub fn unknown() -> Self {
        Self {
            is_valid: false,
            expires: None,
        }
    }
}

/// A stored session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The DID that logged in.
    pub did: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    /// Fixed at creation; never extended.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires: DateTime<Utc>,
}

impl Session {
    /// Whether the session is still valid at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}

/// An outstanding challenge, keyed by DID in the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

/// What a [`sweep`](crate::AuthService::sweep) removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub challenges_removed: usize,
    pub sessions_removed: usize,
}

impl SweepReport {
    /// Total entries evicted.
    pub fn total(&self) -> usize {
        self.challenges_removed + self.sessions_removed
    }
}

/// Store sizes at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStats {
    pub identities: usize,
    pub challenges: usize,
    pub sessions: usize,
    /// Sessions that are still valid right now.
    pub active_sessions: usize,
}
