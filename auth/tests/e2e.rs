//! End-to-end integration tests for NOVA Auth.
//!
//! These run the whole login flow through the public API only: key
//! generation, DID document construction, registration, challenge issuance,
//! real Ed25519 signing, login, and session checks. Nothing here reaches
//! into service internals.
//!
//! Each test builds its own service. No shared state, no ordering
//! dependencies.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use serde_json::json;

use nova_auth::did::did_key_for;
use nova_auth::{
    AuthConfig, AuthError, AuthKeypair, AuthService, DidDocument, ManualClock, PermissiveVerifier,
    SessionStatus,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Registers a fresh keypair under `did` and returns it.
fn enroll(service: &AuthService, did: &str) -> AuthKeypair {
    let keypair = AuthKeypair::generate();
    let document = DidDocument::for_ed25519_key(did, &keypair.public_key())
        .to_value()
        .expect("document serializes");
    service.register_did(did, document).expect("registration");
    keypair
}

/// Challenge, sign, login. Returns the session token.
fn sign_in(service: &AuthService, did: &str, keypair: &AuthKeypair) -> String {
    let challenge = service.issue_challenge(did).expect("challenge");
    let signature = keypair.sign_challenge(&challenge.challenge);
    service.login(did, &signature).expect("login").token
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[test]
fn test_full_flow_with_ed25519_document() {
    let clock = ManualClock::starting_now();
    let service = AuthService::default().with_clock(clock.clone());
    let did = "did:example:alice";

    assert!(!service.did_status(did).is_registered);
    let keypair = enroll(&service, did);
    assert!(service.did_status(did).is_registered);

    let token = sign_in(&service, did, &keypair);
    assert!(token.starts_with("session-did:example:alice-"));

    let status = service.session_status(&token);
    assert!(status.is_valid);

    clock.advance(Duration::from_secs(3600));
    let status = service.session_status(&token);
    assert!(!status.is_valid);
    assert!(status.expires.is_some());
}

#[test]
fn test_did_key_logs_in_with_empty_document() {
    let service = AuthService::default();
    let keypair = AuthKeypair::generate();
    let did = did_key_for(&keypair.public_key());

    // The key lives in the identifier itself.
    service.register_did(&did, json!({})).unwrap();
    let token = sign_in(&service, &did, &keypair);
    assert!(service.session_status(&token).is_valid);
}

#[test]
fn test_permissive_policy_accepts_any_signature() {
    let service = AuthService::new(AuthConfig::default()).with_verifier(PermissiveVerifier);
    service
        .register_did("did:example:1", json!({ "name": "A" }))
        .unwrap();
    service.issue_challenge("did:example:1").unwrap();

    let login = service.login("did:example:1", "sig").unwrap();
    assert_eq!(login.status, "success");
    assert!(login.token.starts_with("session-did:example:1-"));

    let json = serde_json::to_value(service.session_status(&login.token)).unwrap();
    assert_eq!(json["isValid"], true);
    assert_eq!(json["expires"], login.expires.timestamp_millis());
}

#[test]
fn test_sessions_are_independent_per_did() {
    let service = AuthService::default();
    let alice = enroll(&service, "did:example:alice");
    let bob = enroll(&service, "did:example:bob");

    let alice_token = sign_in(&service, "did:example:alice", &alice);
    let bob_token = sign_in(&service, "did:example:bob", &bob);

    assert!(service.revoke_session(&alice_token));
    assert_eq!(service.session_status(&alice_token), SessionStatus::unknown());
    assert!(service.session_status(&bob_token).is_valid);
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[test]
fn test_signature_from_wrong_key_is_rejected() {
    let service = AuthService::default();
    enroll(&service, "did:example:alice");
    let mallory = AuthKeypair::generate();

    let challenge = service.issue_challenge("did:example:alice").unwrap();
    let forged = mallory.sign_challenge(&challenge.challenge);
    assert_eq!(
        service.login("did:example:alice", &forged).unwrap_err(),
        AuthError::InvalidSignature
    );
}

#[test]
fn test_signature_over_wrong_message_is_rejected() {
    let service = AuthService::default();
    let keypair = enroll(&service, "did:example:alice");

    service.issue_challenge("did:example:alice").unwrap();
    let wrong = keypair.sign_challenge("not the challenge");
    assert_eq!(
        service.login("did:example:alice", &wrong).unwrap_err(),
        AuthError::InvalidSignature
    );
}

#[test]
fn test_replayed_signature_is_rejected() {
    let service = AuthService::default();
    let keypair = enroll(&service, "did:example:alice");

    let challenge = service.issue_challenge("did:example:alice").unwrap();
    let signature = keypair.sign_challenge(&challenge.challenge);
    service.login("did:example:alice", &signature).unwrap();

    // No outstanding challenge any more.
    assert_eq!(
        service.login("did:example:alice", &signature).unwrap_err(),
        AuthError::NoChallengeIssued {
            did: "did:example:alice".into()
        }
    );

    // A new challenge invalidates the old signature.
    service.issue_challenge("did:example:alice").unwrap();
    assert_eq!(
        service.login("did:example:alice", &signature).unwrap_err(),
        AuthError::InvalidSignature
    );
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_racing_logins_consume_challenge_once() {
    const RACERS: usize = 16;

    for _ in 0..20 {
        let service = Arc::new(AuthService::default());
        let keypair = enroll(&service, "did:example:alice");
        let challenge = service.issue_challenge("did:example:alice").unwrap();
        let signature = keypair.sign_challenge(&challenge.challenge);

        let barrier = Arc::new(Barrier::new(RACERS));
        let handles: Vec<_> = (0..RACERS)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                let signature = signature.clone();
                thread::spawn(move || {
                    barrier.wait();
                    service.login("did:example:alice", &signature)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for loser in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(loser, AuthError::NoChallengeIssued { .. }));
        }
        assert_eq!(service.stats().sessions, 1);
    }
}

#[test]
fn test_racing_registrations_keep_exactly_one_document() {
    const RACERS: usize = 8;

    let service = Arc::new(AuthService::default());
    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|i| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.register_did("did:example:contested", json!({ "writer": i }))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winner = results
        .iter()
        .find_map(|r| r.as_ref().ok())
        .expect("one registration succeeds");
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        service.document("did:example:contested"),
        Some(winner.did_document.clone())
    );
}

#[test]
fn test_parallel_users_do_not_interfere() {
    let service = Arc::new(AuthService::default());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                let did = format!("did:example:user{}", i);
                let keypair = enroll(&service, &did);
                (0..10)
                    .map(|_| sign_in(&service, &did, &keypair))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let tokens: Vec<String> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(tokens.len(), 80);
    assert!(tokens.iter().all(|t| service.session_status(t).is_valid));
    assert_eq!(service.stats().active_sessions, 80);
}
