// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Auth — Core Library
//!
//! Passwordless login for decentralized identifiers. A DID controller proves
//! it holds the key by signing a server-issued challenge, and gets a
//! short-lived session token in return. No passwords, no password resets,
//! no password database waiting to end up on a paste site.
//!
//! ## The Flow
//!
//! ```text
//! client                                  AuthService
//!   │  register_did(did, document) ──────►  identities
//!   │  issue_challenge(did) ─────────────►  challenges   (one per DID)
//!   │  ◄─────────────────────── nonce
//!   │  sign(nonce) with the DID's key
//!   │  login(did, signature) ────────────►  verify, consume nonce
//!   │  ◄─────────────── token, expires      sessions
//!   │  session_status(token) ────────────►  { isValid, expires }
//! ```
//!
//! ## Modules
//!
//! - **service** — The state machine. Start here.
//! - **verifier** — Pluggable signature checking against DID documents.
//! - **did** — DID parsing, `did:key` derivation, document construction.
//! - **keys** — Ed25519 keypairs and multibase public keys.
//! - **challenge** — Nonce generation. Unguessable or bust.
//! - **clock** — Injectable time, so tests can fast-forward an hour.
//! - **types** — Wire-shaped results (camelCase, millisecond timestamps).
//! - **error** — What can go wrong, and it's a short list.
//! - **config** — Defaults and tunables.
//!
//! ## Design Notes
//!
//! 1. Everything is in memory. Restart the process and everyone logs in again.
//! 2. Challenges are single-use, even under concurrent logins.
//! 3. Session expiry is fixed at login and never extended.
//! 4. Errors never leave half-applied state behind.

pub mod challenge;
pub mod clock;
pub mod config;
pub mod did;
pub mod error;
pub mod keys;
pub mod service;
pub mod types;
pub mod verifier;

pub use challenge::{ChallengeSource, OsRngChallengeSource, SeededChallengeSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use did::DidDocument;
pub use error::AuthError;
pub use keys::{AuthKeypair, PublicKey};
pub use service::AuthService;
pub use types::{
    AuthStats, Challenge, DidStatus, LoginResult, RegistrationResult, Session, SessionStatus,
    SweepReport,
};
pub use verifier::{DocumentKeyVerifier, PermissiveVerifier, SignatureVerifier};
