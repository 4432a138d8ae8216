//! # DID (Decentralized Identifier) Documents
//!
//! The authentication service treats a DID as an opaque string and its
//! document as an opaque JSON payload. This module is the part that *does*
//! know what those look like, for the two places that care:
//!
//! - clients building a document to register (see [`DidDocument`]), and
//! - verifiers digging key material out of a registered document.
//!
//! ## DID Format
//!
//! ```text
//! did:<method>:<method-specific-id>
//! ```
//!
//! `did:key` identifiers are self-certifying: the method-specific id *is*
//! the multibase-encoded public key, so no document lookup is needed to
//! recover it.
//!
//! ## Standards References
//!
//! - [DID Core v1.0](https://www.w3.org/TR/did-core/)
//! - [did:key Method](https://w3c-ccg.github.io/did-method-key/)
//! - [Ed25519VerificationKey2020](https://w3c-ccg.github.io/di-eddsa-2020/)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::PublicKey;

/// Context URI for the W3C DID Core specification.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Context URI for the Ed25519 verification key suite.
pub const ED25519_CONTEXT: &str = "https://w3id.org/security/suites/ed25519-2020/v1";

/// Verification method type for multibase Ed25519 keys.
pub const VERIFICATION_KEY_TYPE: &str = "Ed25519VerificationKey2020";

/// Older verification method type, carrying `publicKeyBase58`.
pub const LEGACY_VERIFICATION_KEY_TYPE: &str = "Ed25519VerificationKey2018";

/// DID method whose identifier embeds the public key.
pub const DID_KEY_METHOD: &str = "key";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during DID operations.
#[derive(Debug, Error)]
pub enum DidError {
    /// The DID string does not match `did:<method>:<identifier>`.
    #[error("invalid DID format: {0}")]
    InvalidFormat(String),

    /// The DID method isn't the one the caller asked for.
    #[error("unsupported DID method: expected '{expected}', got '{got}'")]
    UnsupportedMethod {
        /// Method the operation needs.
        expected: String,
        /// Method found in the DID.
        got: String,
    },

    /// The method-specific identifier does not decode to a key.
    #[error("invalid key in DID: {0}")]
    InvalidKey(String),

    /// Serialization error during document conversion.
    #[error("serialization error: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// DID strings
// ---------------------------------------------------------------------------

/// Split a DID into `(method, method_specific_id)`.
pub fn parse_did(did: &str) -> Result<(&str, &str), DidError> {
    let parts: Vec<&str> = did.splitn(3, ':').collect();
    if parts.len() != 3 {
        return Err(DidError::InvalidFormat(
            "DID must have format 'did:<method>:<identifier>'".into(),
        ));
    }

    if parts[0] != "did" {
        return Err(DidError::InvalidFormat(format!(
            "expected 'did' prefix, got '{}'",
            parts[0]
        )));
    }

    if parts[1].is_empty() || parts[2].is_empty() {
        return Err(DidError::InvalidFormat(
            "method and identifier must be non-empty".into(),
        ));
    }

    Ok((parts[1], parts[2]))
}

/// Build the `did:key` identifier for an Ed25519 public key.
pub fn did_key_for(public_key: &PublicKey) -> String {
    format!("did:{}:{}", DID_KEY_METHOD, public_key.to_multibase())
}

/// Recover the public key embedded in a `did:key` identifier.
///
/// DID URL fragments (`did:key:z6Mk…#z6Mk…`) are ignored.
pub fn public_key_from_did_key(did: &str) -> Result<PublicKey, DidError> {
    let (method, id) = parse_did(did)?;
    if method != DID_KEY_METHOD {
        return Err(DidError::UnsupportedMethod {
            expected: DID_KEY_METHOD.into(),
            got: method.into(),
        });
    }
    let id = id.split('#').next().unwrap_or(id);
    PublicKey::from_multibase(id).map_err(|e| DidError::InvalidKey(e.to_string()))
}

// ---------------------------------------------------------------------------
// DID Document Types
// ---------------------------------------------------------------------------

/// A W3C DID Document for a single-key Ed25519 controller.
///
/// This is the shape clients are expected to register, but the service
/// stores whatever JSON it is handed. Convert with
/// [`to_value`](Self::to_value) before registering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    /// JSON-LD context URIs.
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// The DID string this document describes.
    pub id: String,

    /// Verification methods (cryptographic keys) associated with this DID.
    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,

    /// References to verification methods usable for authentication.
    pub authentication: Vec<String>,

    /// References to verification methods usable for issuing assertions.
    #[serde(rename = "assertionMethod", default)]
    pub assertion_method: Vec<String>,

    /// When this document was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl DidDocument {
    /// Generate a document that authenticates `did` with `public_key`.
    ///
    /// Includes both DID Core and Ed25519-2020 contexts, a single
    /// `#key-1` verification method, and `authentication` /
    /// `assertionMethod` references to it.
    pub fn for_ed25519_key(did: &str, public_key: &PublicKey) -> Self {
        let key_id = format!("{}#key-1", did);

        DidDocument {
            context: vec![DID_CONTEXT.to_string(), ED25519_CONTEXT.to_string()],
            id: did.to_string(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                type_: VERIFICATION_KEY_TYPE.to_string(),
                controller: did.to_string(),
                public_key_multibase: public_key.to_multibase(),
            }],
            authentication: vec![key_id.clone()],
            assertion_method: vec![key_id],
            created: Some(Utc::now()),
        }
    }

    /// Serialize this document to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String, DidError> {
        serde_json::to_string_pretty(self).map_err(|e| DidError::Serialization(e.to_string()))
    }

    /// Parse a DID Document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, DidError> {
        serde_json::from_str(json).map_err(|e| DidError::Serialization(e.to_string()))
    }

    /// Convert to the opaque JSON payload the service stores.
    pub fn to_value(&self) -> Result<serde_json::Value, DidError> {
        serde_json::to_value(self).map_err(|e| DidError::Serialization(e.to_string()))
    }

    /// Validate that the document has the required fields and structure.
    ///
    /// Checks:
    /// - The `id` field is a well-formed DID
    /// - At least one verification method is present
    /// - At least one authentication reference is present
    /// - The DID Core context is included
    pub fn validate(&self) -> Result<(), DidError> {
        parse_did(&self.id)?;

        if self.verification_method.is_empty() {
            return Err(DidError::InvalidFormat(
                "document must have at least one verification method".into(),
            ));
        }

        if self.authentication.is_empty() {
            return Err(DidError::InvalidFormat(
                "document must have at least one authentication method".into(),
            ));
        }

        if !self.context.iter().any(|c| c == DID_CONTEXT) {
            return Err(DidError::InvalidFormat(
                "document must include DID Core context".into(),
            ));
        }

        Ok(())
    }
}

/// A verification method entry in a DID Document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationMethod {
    /// Unique identifier for this verification method (DID URL fragment).
    pub id: String,

    /// The type of cryptographic key (e.g., "Ed25519VerificationKey2020").
    #[serde(rename = "type")]
    pub type_: String,

    /// The DID that controls this verification method.
    pub controller: String,

    /// The public key material in multibase encoding (base58btc with 'z' prefix).
    #[serde(rename = "publicKeyMultibase")]
    pub public_key_multibase: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
