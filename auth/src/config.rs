//! # Authentication Configuration & Constants
//!
//! Every magic number in the auth flow lives here. If you're hardcoding a
//! TTL somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! [`AuthConfig`] bundles the tunables an [`AuthService`](crate::AuthService)
//! is constructed with. The defaults match the documented protocol: one-hour
//! sessions that are never extended.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Version of the challenge/login protocol spoken by this crate.
pub const AUTH_PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Session Parameters
// ---------------------------------------------------------------------------

/// Session lifetime. Set once at login, never renewed.
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

/// How long an expired session stays addressable (reported invalid) before
/// the sweep is allowed to forget it.
pub const SESSION_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Prefix of every minted session token.
pub const SESSION_TOKEN_PREFIX: &str = "session";

/// Random bytes appended to each session token (hex-encoded, so twice as
/// many characters).
pub const SESSION_TOKEN_ENTROPY_BYTES: usize = 16;

// ---------------------------------------------------------------------------
// Challenge Parameters
// ---------------------------------------------------------------------------

/// Default nonce size. 256 bits: unguessable, and still short enough to
/// paste into a signing tool.
pub const CHALLENGE_BYTES: usize = 32;

/// Floor for configurable nonce sizes. Anything under 128 bits is a
/// guessing game we don't want to play.
pub const MIN_CHALLENGE_BYTES: usize = 16;

/// Outstanding challenges older than this are eligible for eviction by the
/// sweep. Login itself does not look at challenge age.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Public (verifying) key length in bytes.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for an [`AuthService`](crate::AuthService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Lifetime of a session from the moment of login.
    pub session_ttl: Duration,

    /// Age after which an unused challenge may be swept.
    pub challenge_ttl: Duration,

    /// Grace period after expiry during which a session is still reported
    /// (as invalid) instead of being forgotten.
    pub session_retention: Duration,

    /// Number of random bytes in each challenge nonce.
    pub challenge_bytes: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: SESSION_TTL,
            challenge_ttl: CHALLENGE_TTL,
            session_retention: SESSION_RETENTION,
            challenge_bytes: CHALLENGE_BYTES,
        }
    }
}

impl AuthConfig {
    /// Override the session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Override the challenge eviction age.
    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    /// Override the post-expiry retention window.
    pub fn with_session_retention(mut self, retention: Duration) -> Self {
        self.session_retention = retention;
        self
    }

    /// Override the nonce size. Values below [`MIN_CHALLENGE_BYTES`] are
    /// clamped up, not rejected.
    pub fn with_challenge_bytes(mut self, bytes: usize) -> Self {
        self.challenge_bytes = bytes.max(MIN_CHALLENGE_BYTES);
        self
    }
}
