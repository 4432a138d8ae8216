//! # Challenge Nonces
//!
//! A challenge is the thing a DID controller signs to prove it holds the
//! key. It has one job: be unguessable. Anything predictable here turns the
//! whole login flow into a replay vulnerability.
//!
//! Generation sits behind [`ChallengeSource`] so the service can be handed a
//! deterministic source in tests. Production code should never need anything
//! but [`OsRngChallengeSource`].

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::config::{CHALLENGE_BYTES, MIN_CHALLENGE_BYTES};

/// Produces fresh challenge nonces, text-encoded.
pub trait ChallengeSource: Send + Sync {
    /// Return a new nonce. Every call must yield a fresh value.
    fn next_challenge(&self) -> String;
}

/// Challenges drawn from the operating system CSPRNG, hex-encoded.
///
/// `OsRng` pulls from `getrandom(2)` on Linux and `BCryptGenRandom` on
/// Windows. If either of those is compromised, login nonces are the least
/// of your worries.
#[derive(Debug, Clone, Copy)]
pub struct OsRngChallengeSource {
    bytes: usize,
}

impl OsRngChallengeSource {
    /// Create a source emitting `bytes` random bytes per nonce, clamped up
    /// to [`MIN_CHALLENGE_BYTES`].
    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(MIN_CHALLENGE_BYTES),
        }
    }

    /// Bytes of entropy per nonce.
    pub fn entropy_bytes(&self) -> usize {
        self.bytes
    }
}

impl Default for OsRngChallengeSource {
    fn default() -> Self {
        Self::new(CHALLENGE_BYTES)
    }
}

impl ChallengeSource for OsRngChallengeSource {
    fn next_challenge(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

/// Deterministic challenges from a seeded `StdRng`.
///
/// Same seed, same sequence. Useful for reproducible tests and nothing else:
/// anyone who knows the seed can predict every challenge.
pub struct SeededChallengeSource {
    rng: Mutex<StdRng>,
    bytes: usize,
}

impl SeededChallengeSource {
    /// Create a source seeded with `seed`, emitting [`CHALLENGE_BYTES`] per nonce.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            bytes: CHALLENGE_BYTES,
        }
    }
}

impl ChallengeSource for SeededChallengeSource {
    fn next_challenge(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        self.rng.lock().fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

/// Fill `len` bytes from the OS CSPRNG and hex-encode them.
///
/// Shared with session token minting, which needs the same kind of
/// unguessable suffix.
pub(crate) fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
