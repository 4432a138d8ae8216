//! # Key Management
//!
//! Ed25519 keypairs for DID controllers, and the public-key type the
//! verifiers work with.
//!
//! The service never holds private keys. [`AuthKeypair`] exists for the
//! client side of the flow (signing a challenge) and for tests; the server
//! side only ever sees [`PublicKey`] values pulled out of DID documents.
//!
//! ## Encodings
//!
//! - Signatures travel as lowercase hex, 128 characters.
//! - Public keys are hex (64 characters) or multibase: a `z` prefix followed
//!   by base58btc of the Ed25519 multicodec header `0xed 0x01` and the raw
//!   32 key bytes. That's the `publicKeyMultibase` form used by
//!   `Ed25519VerificationKey2020` and by `did:key`.
//!
//! Key bytes are never logged. If you add logging to this module, you will
//! be asked to leave.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::{SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH};

/// Multicodec header for Ed25519 public keys (varint `0xed`).
pub const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Multibase prefix for base58btc.
pub const MULTIBASE_BASE58BTC: char = 'z';

/// Errors that can occur while decoding key material or signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not valid hex")]
    InvalidSecretKey,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
}

// ---------------------------------------------------------------------------
// AuthKeypair
// ---------------------------------------------------------------------------

/// An Ed25519 keypair controlling a DID.
///
/// Deliberately not `Serialize`: exporting a secret should be a conscious
/// call to [`secret_key_hex`](Self::secret_key_hex), not a side effect of
/// shoving a struct into a JSON response.
pub struct AuthKeypair {
    signing_key: SigningKey,
}

impl AuthKeypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a keypair deterministically from a 32-byte seed.
    ///
    /// A weak seed gives a weak key. Tests only, or a proper KDF.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parse a hex-encoded 32-byte secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// The public half, safe to publish in a DID document.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign arbitrary bytes.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Sign a login challenge and return the hex signature expected by
    /// [`AuthService::login`](crate::AuthService::login).
    pub fn sign_challenge(&self, challenge: &str) -> String {
        hex::encode(self.sign(challenge.as_bytes()))
    }

    /// Export the secret key as hex. Handle with extreme care.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl Clone for AuthKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for AuthKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material, not even partially.
        write!(f, "AuthKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

/// A 32-byte Ed25519 public key that is known to be a valid curve point.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; 32],
}

impl PublicKey {
    /// Validate and wrap raw key bytes.
    ///
    /// Some 32-byte strings aren't points on the curve; we reject them here
    /// instead of failing mysteriously at verification time.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; VERIFYING_KEY_LENGTH] = slice.try_into().map_err(|_| {
            KeyError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                VERIFYING_KEY_LENGTH,
                slice.len()
            ))
        })?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|_| KeyError::InvalidPublicKey("not a valid Ed25519 point".into()))?;
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| KeyError::InvalidPublicKey(format!("bad hex: {}", e)))?;
        Self::try_from_slice(&bytes)
    }

    /// Parse a raw (non-multicodec) base58btc key, as found in
    /// `publicKeyBase58` of `Ed25519VerificationKey2018` entries.
    pub fn from_base58(s: &str) -> Result<Self, KeyError> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| KeyError::InvalidPublicKey(format!("bad base58: {}", e)))?;
        Self::try_from_slice(&bytes)
    }

    /// Parse a multibase (`z…`) multicodec-prefixed Ed25519 key.
    pub fn from_multibase(s: &str) -> Result<Self, KeyError> {
        let encoded = s
            .strip_prefix(MULTIBASE_BASE58BTC)
            .ok_or_else(|| KeyError::InvalidPublicKey("expected 'z' multibase prefix".into()))?;
        let decoded = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| KeyError::InvalidPublicKey(format!("bad base58: {}", e)))?;
        match decoded.strip_prefix(&ED25519_MULTICODEC[..]) {
            Some(key) => Self::try_from_slice(key),
            None => Err(KeyError::InvalidPublicKey(
                "missing Ed25519 multicodec header".into(),
            )),
        }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Hex-encoded key. 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Multibase encoding: `z` + base58btc(0xed 0x01 ‖ key).
    pub fn to_multibase(&self) -> String {
        let mut multicodec_bytes = ED25519_MULTICODEC.to_vec();
        multicodec_bytes.extend_from_slice(&self.bytes);
        format!(
            "{}{}",
            MULTIBASE_BASE58BTC,
            bs58::encode(&multicodec_bytes).into_string()
        )
    }

    /// Verify a raw 64-byte signature over `message`.
    ///
    /// Uses strict verification: we reject the malleable edge cases that
    /// lenient implementations accept.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(signature);
        verifying_key.verify_strict(message, &sig).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

/// Decode a hex-encoded Ed25519 signature into its 64 raw bytes.
pub fn decode_signature(signature: &str) -> Result<[u8; 64], KeyError> {
    let bytes = hex::decode(signature.trim())
        .map_err(|e| KeyError::InvalidSignature(format!("bad hex: {}", e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        KeyError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LENGTH,
            bytes.len()
        ))
    })
}
