//! Error types for the authentication flow.
//!
//! Every [`AuthService`](crate::AuthService) operation that can fail returns
//! an [`AuthError`]. Each variant is one violated precondition; none of them
//! are retryable by the service itself, and none leave partial state behind.

use thiserror::Error;

/// Errors surfaced by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The DID string is empty.
    #[error("invalid DID: {0}")]
    InvalidDid(String),

    /// Registration was attempted for a DID that already has a document.
    #[error("DID already registered: {did}")]
    AlreadyRegistered {
        /// The DID that was already present.
        did: String,
    },

    /// Login was attempted for a DID with no registered document.
    #[error("DID not registered: {did}")]
    NotRegistered {
        /// The unknown DID.
        did: String,
    },

    /// Login was attempted without an outstanding challenge, or the
    /// challenge was consumed by a concurrent login first.
    #[error("no challenge issued for DID: {did}")]
    NoChallengeIssued {
        /// The DID that has no outstanding challenge.
        did: String,
    },

    /// The signature did not verify against the outstanding challenge.
    ///
    /// Intentionally vague: we don't tell callers whether the key, the
    /// encoding, or the bytes were wrong.
    #[error("invalid signature")]
    InvalidSignature,
}

impl AuthError {
    /// Stable machine-readable name of the error kind, used by transports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidDid(_) => "InvalidDid",
            Self::AlreadyRegistered { .. } => "AlreadyRegistered",
            Self::NotRegistered { .. } => "NotRegistered",
            Self::NoChallengeIssued { .. } => "NoChallengeIssued",
            Self::InvalidSignature => "InvalidSignature",
        }
    }
}
