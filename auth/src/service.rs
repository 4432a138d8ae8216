//! # Identity Authentication Service
//!
//! Owns the three stores of the login flow and the transitions between
//! them:
//!
//! ```text
//! register_did ──► identities
//! issue_challenge ──► challenges ──┐
//!                                   ├─ login ──► sessions
//! identities ───────────────────────┘
//! ```
//!
//! Per DID: `Unregistered → Registered → (ChallengeIssued ⇄ NoChallenge)`.
//! Per session token: `Active → Expired`, never the other way round.
//!
//! ## Concurrency
//!
//! - Stores are `DashMap`s, so unrelated DIDs never contend on a global lock.
//! - Registration goes through the entry API: the "already there?" check and
//!   the insert happen under the same shard lock.
//! - Login consumes the challenge with a compare-and-remove on the exact
//!   nonce that was verified. Two racing logins for one challenge produce one
//!   session and one `NoChallengeIssued`.
//! - No `Ref` into a map is held across a call that touches the same map.
//!   DashMap will deadlock if you try.
//!
//! ## Failure atomicity
//!
//! Every error is returned before the first mutation. A rejected login
//! leaves the challenge in place for a corrected retry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::challenge::{random_hex, ChallengeSource, OsRngChallengeSource};
use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, SESSION_TOKEN_ENTROPY_BYTES, SESSION_TOKEN_PREFIX};
use crate::error::AuthError;
use crate::types::{
    AuthStats, Challenge, DidStatus, LoginResult, PendingChallenge, RegistrationResult, Session,
    SessionStatus, SweepReport, STATUS_SUCCESS,
};
use crate::verifier::{DocumentKeyVerifier, SignatureVerifier};

/// The authentication state machine.
///
/// Construct one per process (or per test) and share it behind an `Arc`;
/// every operation takes `&self`.
pub struct AuthService {
    config: AuthConfig,

    /// DID → registered document.
    identities: DashMap<String, Value>,

    /// DID → outstanding challenge. At most one per DID.
    challenges: DashMap<String, PendingChallenge>,

    /// Session token → session record.
    sessions: DashMap<String, Session>,

    challenge_source: Arc<dyn ChallengeSource>,
    verifier: Arc<dyn SignatureVerifier>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthService")
            .field("identities", &self.identities.len())
            .field("challenges", &self.challenges.len())
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for AuthService {
    fn default() -> Self {
        Self::new(AuthConfig::default())
    }
}

impl AuthService {
    /// Creates a service with OS-random challenges, document-key signature
    /// verification, and the system clock.
    pub fn new(config: AuthConfig) -> Self {
        let challenge_source = Arc::new(OsRngChallengeSource::new(config.challenge_bytes));
        Self {
            config,
            identities: DashMap::new(),
            challenges: DashMap::new(),
            sessions: DashMap::new(),
            challenge_source,
            verifier: Arc::new(DocumentKeyVerifier),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the challenge generator.
    pub fn with_challenge_source<S: ChallengeSource + 'static>(mut self, source: S) -> Self {
        self.challenge_source = Arc::new(source);
        self
    }

    /// Replace the signature verifier.
    pub fn with_verifier<V: SignatureVerifier + 'static>(mut self, verifier: V) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    /// Replace the time source.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The configuration this service runs with.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Identities
    // -----------------------------------------------------------------------

    /// Registers `did` with its identity document.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidDid`] if `did` is empty.
    /// - [`AuthError::AlreadyRegistered`] if `did` already has a document.
    ///   The existing document is left untouched.
    pub fn register_did(&self, did: &str, document: Value) -> Result<RegistrationResult, AuthError> {
        check_did(did)?;

        match self.identities.entry(did.to_string()) {
            Entry::Occupied(_) => {
                warn!(did, "registration rejected: DID already registered");
                Err(AuthError::AlreadyRegistered { did: did.into() })
            }
            Entry::Vacant(slot) => {
                slot.insert(document.clone());
                info!(did, "DID registered");
                Ok(RegistrationResult {
                    status: STATUS_SUCCESS.into(),
                    message: format!("DID {} registered", did),
                    did_document: document,
                })
            }
        }
    }

    /// Whether `did` has been registered. Never fails.
    pub fn did_status(&self, did: &str) -> DidStatus {
        DidStatus {
            is_registered: self.identities.contains_key(did),
        }
    }

    /// The document registered for `did`, if any.
    pub fn document(&self, did: &str) -> Option<Value> {
        self.identities.get(did).map(|doc| doc.value().clone())
    }

    // -----------------------------------------------------------------------
    // Challenges
    // -----------------------------------------------------------------------

    /// Issues a fresh challenge for `did`, replacing any outstanding one.
    ///
    /// Registration is not required here; an unregistered DID can collect
    /// challenges all day and still fail at login.
    pub fn issue_challenge(&self, did: &str) -> Result<Challenge, AuthError> {
        check_did(did)?;

        let nonce = self.challenge_source.next_challenge();
        let replaced = self
            .challenges
            .insert(
                did.to_string(),
                PendingChallenge {
                    nonce: nonce.clone(),
                    issued_at: self.clock.now(),
                },
            )
            .is_some();

        debug!(
            did,
            replaced,
            registered = self.identities.contains_key(did),
            "challenge issued"
        );
        Ok(Challenge { challenge: nonce })
    }

    // -----------------------------------------------------------------------
    // Login & sessions
    // -----------------------------------------------------------------------

    /// Verifies `signature` over the outstanding challenge for `did` and,
    /// on success, consumes the challenge and opens a session.
    ///
    /// Checks, in order:
    ///
    /// 1. **Registered** — else [`AuthError::NotRegistered`].
    /// 2. **Challenge outstanding** — else [`AuthError::NoChallengeIssued`].
    /// 3. **Signature valid** — else [`AuthError::InvalidSignature`].
    ///
    /// If a concurrent login consumes (or a new challenge replaces) the
    /// verified nonce before this one can remove it, the result is
    /// [`AuthError::NoChallengeIssued`] and no session is created.
    pub fn login(&self, did: &str, signature: &str) -> Result<LoginResult, AuthError> {
        let document = self
            .identities
            .get(did)
            .map(|doc| doc.value().clone())
            .ok_or_else(|| AuthError::NotRegistered { did: did.into() })?;

        let nonce = self
            .challenges
            .get(did)
            .map(|pending| pending.nonce.clone())
            .ok_or_else(|| AuthError::NoChallengeIssued { did: did.into() })?;

        if let Err(reason) = self.verifier.verify(did, &document, &nonce, signature) {
            warn!(did, "login rejected: invalid signature");
            debug!(did, %reason, "signature rejection detail");
            return Err(AuthError::InvalidSignature);
        }

        // Compare-and-remove: only the nonce we just verified may be consumed.
        if self
            .challenges
            .remove_if(did, |_, pending| pending.nonce == nonce)
            .is_none()
        {
            warn!(did, "login lost race: challenge already consumed or replaced");
            return Err(AuthError::NoChallengeIssued { did: did.into() });
        }

        let issued_at = self.clock.now();
        let session = Session {
            did: did.to_string(),
            issued_at,
            expires: add_duration(issued_at, self.config.session_ttl),
        };
        let expires = session.expires;
        let token = self.insert_session(session);

        info!(did, expires = %expires, "login succeeded, session opened");
        Ok(LoginResult {
            status: STATUS_SUCCESS.into(),
            token,
            expires,
        })
    }

    /// Reports whether `token` names a session that is still valid.
    ///
    /// Unknown tokens report `{isValid: false}` with no expiry. Expired
    /// sessions stay visible, with their expiry, until swept.
    pub fn session_status(&self, token: &str) -> SessionStatus {
        let Some(expires) = self.sessions.get(token).map(|s| s.expires) else {
            return SessionStatus::unknown();
        };
        SessionStatus {
            is_valid: self.clock.now() < expires,
            expires: Some(expires),
        }
    }

    /// The stored session record for `token`, if any.
    pub fn session(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|s| s.value().clone())
    }

    /// Ends a session early (logout). Returns `false` if the token was
    /// unknown.
    pub fn revoke_session(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, session)) => {
                info!(did = %session.did, "session revoked");
                true
            }
            None => false,
        }
    }

    /// Mints a token that is not already in use and stores `session` under it.
    fn insert_session(&self, session: Session) -> String {
        loop {
            let token = format!(
                "{}-{}-{}-{}",
                SESSION_TOKEN_PREFIX,
                session.did,
                session.issued_at.timestamp_millis(),
                random_hex(SESSION_TOKEN_ENTROPY_BYTES),
            );
            if let Entry::Vacant(slot) = self.sessions.entry(token.clone()) {
                slot.insert(session);
                return token;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Evicts stale challenges and long-expired sessions.
    ///
    /// - Challenges issued at or before `now - challenge_ttl` are removed.
    /// - Sessions whose expiry is at or before `now - session_retention` are
    ///   removed. Sessions that expired more recently stay addressable.
    ///
    /// Intended to be called periodically by the hosting node.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let challenge_cutoff = sub_duration(now, self.config.challenge_ttl);
        let session_cutoff = sub_duration(now, self.config.session_retention);

        let mut report = SweepReport::default();

        self.challenges.retain(|_, pending| {
            let keep = pending.issued_at > challenge_cutoff;
            if !keep {
                report.challenges_removed += 1;
            }
            keep
        });

        self.sessions.retain(|_, session| {
            let keep = session.expires > session_cutoff;
            if !keep {
                report.sessions_removed += 1;
            }
            keep
        });

        if report.total() > 0 {
            info!(
                challenges = report.challenges_removed,
                sessions = report.sessions_removed,
                "swept stale auth state"
            );
        }
        report
    }

    /// Current store sizes.
    pub fn stats(&self) -> AuthStats {
        let now = self.clock.now();
        AuthStats {
            identities: self.identities.len(),
            challenges: self.challenges.len(),
            sessions: self.sessions.len(),
            active_sessions: self
                .sessions
                .iter()
                .filter(|entry| entry.value().is_valid_at(now))
                .count(),
        }
    }
}

/// A DID must be non-empty. Beyond that it is opaque to the service.
fn check_did(did: &str) -> Result<(), AuthError> {
    if did.is_empty() {
        return Err(AuthError::InvalidDid("DID must not be empty".into()));
    }
    Ok(())
}

fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn sub_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::SeededChallengeSource;
    use crate::clock::ManualClock;
    use crate::did::DidDocument;
    use crate::keys::AuthKeypair;
    use crate::verifier::PermissiveVerifier;
    use serde_json::json;

    /// Service that accepts any non-empty signature, with a clock
    /// the test controls.
    fn permissive_service() -> (AuthService, ManualClock) {
        let clock = ManualClock::starting_now();
        let service = AuthService::new(AuthConfig::default())
            .with_verifier(PermissiveVerifier)
            .with_clock(clock.clone());
        (service, clock)
    }

    /// Service with real Ed25519 verification and a registered keyed DID.
    fn keyed_service() -> (AuthService, AuthKeypair, ManualClock) {
        let clock = ManualClock::starting_now();
        let service = AuthService::default().with_clock(clock.clone());
        let kp = AuthKeypair::generate();
        let doc = DidDocument::for_ed25519_key("did:example:alice", &kp.public_key());
        service
            .register_did("did:example:alice", doc.to_value().unwrap())
            .unwrap();
        (service, kp, clock)
    }

    // -- Registration --------------------------------------------------------

    #[test]
    fn test_register_then_status_reports_registered() {
        let (service, _) = permissive_service();
        assert!(!service.did_status("did:example:1").is_registered);

        let result = service
            .register_did("did:example:1", json!({ "name": "A" }))
            .unwrap();
        assert_eq!(result.status, "success");
        assert_eq!(result.message, "DID did:example:1 registered");
        assert_eq!(result.did_document, json!({ "name": "A" }));

        assert!(service.did_status("did:example:1").is_registered);
    }

    #[test]
    fn test_double_registration_fails_and_keeps_first_document() {
        let (service, _) = permissive_service();
        service
            .register_did("did:example:1", json!({ "name": "A" }))
            .unwrap();

        let err = service
            .register_did("did:example:1", json!({ "name": "B" }))
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::AlreadyRegistered {
                did: "did:example:1".into()
            }
        );
        assert_eq!(service.document("did:example:1"), Some(json!({ "name": "A" })));
    }

    #[test]
    fn test_empty_did_rejected() {
        let (service, _) = permissive_service();
        assert!(matches!(
            service.register_did("", json!({})),
            Err(AuthError::InvalidDid(_))
        ));
        assert!(matches!(
            service.issue_challenge(""),
            Err(AuthError::InvalidDid(_))
        ));
        assert_eq!(service.stats().identities, 0);
        assert_eq!(service.stats().challenges, 0);
    }

    #[test]
    fn test_whitespace_did_is_opaque() {
        let (service, _) = permissive_service();
        service.register_did("   ", json!({})).unwrap();
        assert!(service.did_status("   ").is_registered);
        service.issue_challenge("   ").unwrap();
        assert!(service.login("   ", "sig").is_ok());
    }

    // -- Challenges ----------------------------------------------------------

    #[test]
    fn test_challenge_is_issued_without_registration() {
        let (service, _) = permissive_service();
        let challenge = service.issue_challenge("did:example:ghost").unwrap();
        assert!(!challenge.challenge.is_empty());
        assert_eq!(service.stats().challenges, 1);
    }

    #[test]
    fn test_new_challenge_overwrites_previous() {
        let (service, kp, _) = keyed_service();
        let first = service.issue_challenge("did:example:alice").unwrap();
        let second = service.issue_challenge("did:example:alice").unwrap();
        assert_ne!(first.challenge, second.challenge);
        assert_eq!(service.stats().challenges, 1);

        // Signing the stale challenge no longer works.
        let stale = kp.sign_challenge(&first.challenge);
        assert_eq!(
            service.login("did:example:alice", &stale).unwrap_err(),
            AuthError::InvalidSignature
        );
        let fresh = kp.sign_challenge(&second.challenge);
        assert!(service.login("did:example:alice", &fresh).is_ok());
    }

    #[test]
    fn test_seeded_source_makes_challenges_predictable() {
        let service = AuthService::default().with_challenge_source(SeededChallengeSource::new(7));
        let reference = SeededChallengeSource::new(7);
        let issued = service.issue_challenge("did:example:1").unwrap();
        assert_eq!(issued.challenge, reference.next_challenge());
    }

    // -- Login ---------------------------------------------------------------

    #[test]
    fn test_login_unregistered_fails_even_with_challenge() {
        let (service, _) = permissive_service();
        service.issue_challenge("did:example:2").unwrap();
        assert_eq!(
            service.login("did:example:2", "sig").unwrap_err(),
            AuthError::NotRegistered {
                did: "did:example:2".into()
            }
        );
        // Challenge untouched.
        assert_eq!(service.stats().challenges, 1);
    }

    #[test]
    fn test_login_without_challenge_fails() {
        let (service, _) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        assert_eq!(
            service.login("did:example:1", "sig").unwrap_err(),
            AuthError::NoChallengeIssued {
                did: "did:example:1".into()
            }
        );
    }

    #[test]
    fn test_challenge_is_single_use() {
        let (service, _) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        service.issue_challenge("did:example:1").unwrap();

        service.login("did:example:1", "sig").unwrap();
        assert_eq!(
            service.login("did:example:1", "sig").unwrap_err(),
            AuthError::NoChallengeIssued {
                did: "did:example:1".into()
            }
        );
        assert_eq!(service.stats().sessions, 1);
    }

    #[test]
    fn test_invalid_signature_leaves_challenge_in_place() {
        let (service, kp, _) = keyed_service();
        let challenge = service.issue_challenge("did:example:alice").unwrap();

        let intruder = AuthKeypair::generate();
        let forged = intruder.sign_challenge(&challenge.challenge);
        assert_eq!(
            service.login("did:example:alice", &forged).unwrap_err(),
            AuthError::InvalidSignature
        );
        assert_eq!(service.stats().challenges, 1);
        assert_eq!(service.stats().sessions, 0);

        // The rightful owner can still use the same challenge.
        let good = kp.sign_challenge(&challenge.challenge);
        assert!(service.login("did:example:alice", &good).is_ok());
    }

    #[test]
    fn test_empty_signature_rejected_by_permissive_policy() {
        let (service, _) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        service.issue_challenge("did:example:1").unwrap();
        assert_eq!(
            service.login("did:example:1", "").unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[test]
    fn test_login_token_shape_and_expiry() {
        let (service, clock) = permissive_service();
        service
            .register_did("did:example:1", json!({ "name": "A" }))
            .unwrap();
        service.issue_challenge("did:example:1").unwrap();

        let now = clock.now();
        let result = service.login("did:example:1", "sig").unwrap();
        assert_eq!(result.status, "success");
        assert_eq!(result.expires, now + chrono::Duration::seconds(3600));

        let rest = result.token.strip_prefix("session-did:example:1-").unwrap();
        let (stamp, entropy) = rest.split_once('-').unwrap();
        assert_eq!(stamp.parse::<i64>().unwrap(), now.timestamp_millis());
        assert_eq!(entropy.len(), SESSION_TOKEN_ENTROPY_BYTES * 2);
    }

    #[test]
    fn test_concurrent_logins_at_same_instant_get_distinct_tokens() {
        let (service, _) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();

        // The manual clock doesn't move, so every login shares a timestamp.
        let mut tokens = std::collections::HashSet::new();
        for _ in 0..50 {
            service.issue_challenge("did:example:1").unwrap();
            tokens.insert(service.login("did:example:1", "sig").unwrap().token);
        }
        assert_eq!(tokens.len(), 50);
    }

    // -- Sessions ------------------------------------------------------------

    #[test]
    fn test_session_expires_and_never_revives() {
        let (service, clock) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        service.issue_challenge("did:example:1").unwrap();
        let login = service.login("did:example:1", "sig").unwrap();

        let status = service.session_status(&login.token);
        assert!(status.is_valid);
        assert_eq!(status.expires, Some(login.expires));

        clock.advance(Duration::from_secs(3599));
        assert!(service.session_status(&login.token).is_valid);

        clock.advance(Duration::from_secs(1));
        let status = service.session_status(&login.token);
        assert!(!status.is_valid);
        assert_eq!(status.expires, Some(login.expires));

        // A fresh login does not extend the old session.
        service.issue_challenge("did:example:1").unwrap();
        service.login("did:example:1", "sig").unwrap();
        assert!(!service.session_status(&login.token).is_valid);
    }

    #[test]
    fn test_unknown_token_is_invalid_without_expiry() {
        let (service, _) = permissive_service();
        assert_eq!(service.session_status("nonexistent"), SessionStatus::unknown());
    }

    #[test]
    fn test_revoke_session_removes_token() {
        let (service, _) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        service.issue_challenge("did:example:1").unwrap();
        let login = service.login("did:example:1", "sig").unwrap();

        assert!(service.revoke_session(&login.token));
        assert_eq!(service.session_status(&login.token), SessionStatus::unknown());
        assert!(!service.revoke_session(&login.token));
    }

    #[test]
    fn test_custom_session_ttl_applies() {
        let clock = ManualClock::starting_now();
        let service = AuthService::new(AuthConfig::default().with_session_ttl(Duration::from_secs(60)))
            .with_verifier(PermissiveVerifier)
            .with_clock(clock.clone());
        service.register_did("did:example:1", json!({})).unwrap();
        service.issue_challenge("did:example:1").unwrap();
        let login = service.login("did:example:1", "sig").unwrap();

        assert_eq!(login.expires, clock.now() + chrono::Duration::seconds(60));
        clock.advance(Duration::from_secs(61));
        assert!(!service.session_status(&login.token).is_valid);
    }

    // -- Sweep & stats -------------------------------------------------------

    #[test]
    fn test_sweep_evicts_stale_challenges_only() {
        let (service, clock) = permissive_service();
        service.issue_challenge("did:example:old").unwrap();
        clock.advance(Duration::from_secs(500));
        service.issue_challenge("did:example:new").unwrap();
        clock.advance(Duration::from_secs(200));

        let report = service.sweep();
        assert_eq!(report.challenges_removed, 1);
        assert_eq!(service.stats().challenges, 1);
    }

    #[test]
    fn test_sweep_keeps_recently_expired_sessions_addressable() {
        let (service, clock) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        service.issue_challenge("did:example:1").unwrap();
        let login = service.login("did:example:1", "sig").unwrap();

        // Expired, but inside the 24h retention window.
        clock.advance(Duration::from_secs(2 * 3600));
        assert_eq!(service.sweep().sessions_removed, 0);
        let status = service.session_status(&login.token);
        assert!(!status.is_valid);
        assert!(status.expires.is_some());

        // Past retention: forgotten.
        clock.advance(Duration::from_secs(24 * 3600));
        assert_eq!(service.sweep().sessions_removed, 1);
        assert_eq!(service.session_status(&login.token), SessionStatus::unknown());
    }

    #[test]
    fn test_sweep_never_touches_identities() {
        let (service, clock) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        clock.advance(Duration::from_secs(365 * 24 * 3600));
        service.sweep();
        assert!(service.did_status("did:example:1").is_registered);
    }

    #[test]
    fn test_stats_count_active_sessions() {
        let (service, clock) = permissive_service();
        service.register_did("did:example:1", json!({})).unwrap();
        service.issue_challenge("did:example:1").unwrap();
        service.login("did:example:1", "sig").unwrap();

        clock.advance(Duration::from_secs(1800));
        service.issue_challenge("did:example:1").unwrap();
        service.login("did:example:1", "sig").unwrap();

        clock.advance(Duration::from_secs(1800));
        let stats = service.stats();
        assert_eq!(stats.identities, 1);
        assert_eq!(stats.challenges, 0);
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.active_sessions, 1);
    }
}
