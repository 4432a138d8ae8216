//! # Challenge Signature Verification
//!
//! Login succeeds only if the caller can sign the outstanding challenge with
//! a key the registered DID document vouches for. This module decides what
//! "a key the document vouches for" means, and how to check the signature.
//!
//! ## Key discovery
//!
//! [`extract_key_material`] walks the document's `verificationMethod`
//! entries and understands three encodings:
//!
//! - `publicKeyMultibase` (`Ed25519VerificationKey2020`, `Multikey`)
//! - `publicKeyBase58` (`Ed25519VerificationKey2018`)
//! - `publicKeyHex`
//!
//! If the document lists `authentication` relationships, only the methods
//! they reference (or embed) count. A key that is merely an assertion key
//! does not get to log anyone in. For `did:key` identifiers the DID itself
//! carries the key, so it is always added.
//!
//! ## Verifiers
//!
//! - [`DocumentKeyVerifier`] — the real thing. Hex-encoded 64-byte Ed25519
//!   signature over the UTF-8 challenge, accepted if any discovered key
//!   verifies it.
//! - [`PermissiveVerifier`] — accepts any non-empty signature. Exists for
//!   local development against clients that cannot sign yet. Never enable
//!   it on anything reachable from the internet.

use serde_json::Value;
use thiserror::Error;

use crate::did::public_key_from_did_key;
use crate::keys::{decode_signature, PublicKey};

/// Why a signature was rejected.
///
/// Callers only ever see [`AuthError::InvalidSignature`](crate::AuthError);
/// these details go to the debug log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("signature is empty")]
    EmptySignature,

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("document contains no usable authentication key")]
    NoKeyMaterial,

    #[error("signature does not match any authentication key")]
    Mismatch,
}

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// Verification material pulled out of a DID document, one variant per
/// supported signature scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// An Ed25519 public key.
    Ed25519(PublicKey),
}

impl KeyMaterial {
    /// Human-readable scheme name, for logs.
    pub fn scheme(&self) -> &'static str {
        match self {
            KeyMaterial::Ed25519(_) => "Ed25519",
        }
    }

    /// Check a text-encoded signature over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<(), VerifyError> {
        match self {
            KeyMaterial::Ed25519(public_key) => {
                let sig = decode_signature(signature)
                    .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;
                if public_key.verify(message, &sig) {
                    Ok(())
                } else {
                    Err(VerifyError::Mismatch)
                }
            }
        }
    }
}

/// Decode a single verification method object into key material.
///
/// Returns `None` for methods in encodings or schemes we don't speak; an
/// unknown method type is not an error, it just can't authenticate.
fn key_from_method(method: &Value) -> Option<KeyMaterial> {
    let decoded = if let Some(mb) = method.get("publicKeyMultibase").and_then(Value::as_str) {
        PublicKey::from_multibase(mb)
    } else if let Some(b58) = method.get("publicKeyBase58").and_then(Value::as_str) {
        PublicKey::from_base58(b58)
    } else if let Some(hex_key) = method.get("publicKeyHex").and_then(Value::as_str) {
        PublicKey::from_hex(hex_key)
    } else {
        return None;
    };

    match decoded {
        Ok(pk) => Some(KeyMaterial::Ed25519(pk)),
        Err(e) => {
            let method_id = method.get("id").and_then(Value::as_str).unwrap_or("<none>");
            tracing::debug!(
                method_id,
                error = %e,
                "skipping undecodable verification method"
            );
            None
        }
    }
}

/// Does verification method `method_id` match the reference `reference`?
///
/// References may be absolute (`did:x#key-1`) or relative (`#key-1`).
fn reference_matches(reference: &str, method_id: &str) -> bool {
    if reference == method_id {
        return true;
    }
    match (reference.find('#'), method_id.find('#')) {
        (Some(0), Some(i)) => &method_id[i..] == reference,
        (Some(i), Some(0)) => &reference[i..] == method_id,
        _ => false,
    }
}

/// Collect every key that may authenticate `did`, in document order.
pub fn extract_key_material(did: &str, document: &Value) -> Vec<KeyMaterial> {
    let methods: Vec<&Value> = document
        .get("verificationMethod")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter(|m| m.is_object()).collect())
        .unwrap_or_default();

    let authentication = document
        .get("authentication")
        .and_then(Value::as_array)
        .filter(|arr| !arr.is_empty());

    let mut keys = Vec::new();

    match authentication {
        Some(relationships) => {
            for entry in relationships {
                match entry {
                    Value::String(reference) => {
                        for method in &methods {
                            let id = method.get("id").and_then(Value::as_str).unwrap_or("");
                            if reference_matches(reference, id) {
                                keys.extend(key_from_method(method));
                            }
                        }
                    }
                    // Embedded verification method.
                    Value::Object(_) => keys.extend(key_from_method(entry)),
                    _ => {}
                }
            }
        }
        None => keys.extend(methods.iter().filter_map(|m| key_from_method(m))),
    }

    if let Ok(pk) = public_key_from_did_key(did) {
        let material = KeyMaterial::Ed25519(pk);
        if !keys.contains(&material) {
            keys.push(material);
        }
    }

    keys
}

// ---------------------------------------------------------------------------
// Verifiers
// ---------------------------------------------------------------------------

/// Decides whether `signature` proves control of `did` for `challenge`.
pub trait SignatureVerifier: Send + Sync {
    /// Accept or reject a login signature.
    ///
    /// * `did` — the DID logging in.
    /// * `document` — its registered document, as stored.
    /// * `challenge` — the outstanding nonce that should have been signed.
    /// * `signature` — the caller's text-encoded signature.
    fn verify(
        &self,
        did: &str,
        document: &Value,
        challenge: &str,
        signature: &str,
    ) -> Result<(), VerifyError>;
}

/// Verifies against the key material in the registered document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentKeyVerifier;

impl SignatureVerifier for DocumentKeyVerifier {
    fn verify(
        &self,
        did: &str,
        document: &Value,
        challenge: &str,
        signature: &str,
    ) -> Result<(), VerifyError> {
        if signature.trim().is_empty() {
            return Err(VerifyError::EmptySignature);
        }

        let keys = extract_key_material(did, document);
        if keys.is_empty() {
            return Err(VerifyError::NoKeyMaterial);
        }

        let mut last_err = VerifyError::Mismatch;
        for key in &keys {
            match key.verify(challenge.as_bytes(), signature) {
                Ok(()) => {
                    tracing::trace!(did, scheme = key.scheme(), "challenge signature verified");
                    return Ok(());
                }
                // A malformed encoding fails identically for every key.
                Err(e @ VerifyError::MalformedSignature(_)) => return Err(e),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

/// Accepts any non-empty signature without looking at it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveVerifier;

impl SignatureVerifier for PermissiveVerifier {
    fn verify(
        &self,
        _did: &str,
        _document: &Value,
        _challenge: &str,
        signature: &str,
    ) -> Result<(), VerifyError> {
        if signature.is_empty() {
            Err(VerifyError::EmptySignature)
        } else {
            Ok(())
        }
    }
}
