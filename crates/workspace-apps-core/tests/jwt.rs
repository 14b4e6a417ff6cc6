// crates/workspace-apps-core/tests/jwt.rs
// ============================================================================
// Module: Token Envelope Tests
// Description: Signed app tokens and encrypted API key payloads.
// Purpose: Ensure tokens fail closed on tampering, expiry, and key rotation.
// Dependencies: workspace-apps-core, tokio
// ============================================================================

//! Signing, verification, and encryption tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap for clarity."
)]

mod common;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use time::Duration;
use workspace_apps_core::API_KEY_AUDIENCE;
use workspace_apps_core::API_KEY_ISSUER;
use workspace_apps_core::AccessMethod;
use workspace_apps_core::AgentId;
use workspace_apps_core::ClaimExpectations;
use workspace_apps_core::EncryptedApiKeyPayload;
use workspace_apps_core::EncryptionKey;
use workspace_apps_core::KeyError;
use workspace_apps_core::RegisteredClaims;
use workspace_apps_core::Request;
use workspace_apps_core::SignedToken;
use workspace_apps_core::SigningKey;
use workspace_apps_core::StaticKeycache;
use workspace_apps_core::TokenError;
use workspace_apps_core::UserId;
use workspace_apps_core::WorkspaceId;
use workspace_apps_core::decrypt_payload;
use workspace_apps_core::encrypt_payload;
use workspace_apps_core::sign_token;
use workspace_apps_core::verify_token;

use crate::common::NOW;

fn keys(signing_id: &str, encryption_id: &str, fill: u8) -> StaticKeycache {
    StaticKeycache::new(
        SigningKey {
            id: signing_id.to_string(),
            secret: vec![fill; 64],
        },
        EncryptionKey {
            id: encryption_id.to_string(),
            secret: [fill; 32],
        },
    )
}

fn token(expires_in: Duration) -> SignedToken {
    SignedToken {
        claims: RegisteredClaims {
            exp: Some((NOW + expires_in).unix_timestamp()),
            ..RegisteredClaims::default()
        },
        request: Request::path_app("/@alice/dev/apps/code", "alice", "dev", "code").normalize(),
        user_id: UserId::new_random(),
        workspace_id: WorkspaceId::new_random(),
        agent_id: AgentId::new_random(),
        app_url: "http://127.0.0.1:8080".to_string(),
    }
}

#[tokio::test]
async fn signed_token_verifies_with_same_key() {
    let keycache = keys("k1", "e1", 7);
    let original = token(Duration::minutes(1));
    let compact = sign_token(&keycache, &original).await.unwrap();
    assert_eq!(compact.split('.').count(), 3);

    let decoded: SignedToken =
        verify_token(&keycache, &compact, &ClaimExpectations::at(NOW)).await.unwrap();
    assert_eq!(decoded, original);
}

#[tokio::test]
async fn signed_token_header_names_algorithm_and_key() {
    let keycache = keys("k1", "e1", 7);
    let compact = sign_token(&keycache, &token(Duration::minutes(1))).await.unwrap();
    let header = compact.split('.').next().unwrap();
    let header: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).unwrap()).unwrap();
    assert_eq!(header, json!({ "alg": "HS512", "kid": "k1" }));
}

#[tokio::test]
async fn other_algorithms_are_rejected_before_key_lookup() {
    let keycache = keys("k1", "e1", 7);
    let compact = sign_token(&keycache, &token(Duration::minutes(1))).await.unwrap();
    let parts: Vec<&str> = compact.split('.').collect();
    let downgraded = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","kid":"k1"}"#);
    let forged = format!("{downgraded}.{}.{}", parts[1], parts[2]);
    let err = verify_token::<SignedToken>(&keycache, &forged, &ClaimExpectations::at(NOW))
        .await
        .unwrap_err();
    assert_eq!(err, TokenError::UnsupportedAlgorithm("HS256".to_string()));
}

#[tokio::test]
async fn signed_token_issuer_is_enforced_when_expected() {
    let keycache = keys("k1", "e1", 7);
    let mut issued = token(Duration::minutes(1));
    issued.claims.iss = Some("coderd".to_string());
    let compact = sign_token(&keycache, &issued).await.unwrap();

    let same = ClaimExpectations::at(NOW).with_issuer("coderd");
    assert!(verify_token::<SignedToken>(&keycache, &compact, &same).await.is_ok());
    let other = ClaimExpectations::at(NOW).with_issuer("wsproxy");
    let err = verify_token::<SignedToken>(&keycache, &compact, &other).await.unwrap_err();
    assert_eq!(err, TokenError::InvalidIssuer);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let keycache = keys("k1", "e1", 7);
    let compact = sign_token(&keycache, &token(Duration::minutes(1))).await.unwrap();
    let later = ClaimExpectations::at(NOW + Duration::minutes(2));
    let err = verify_token::<SignedToken>(&keycache, &compact, &later).await.unwrap_err();
    assert_eq!(err, TokenError::Expired);
}

#[tokio::test]
async fn tampered_body_fails_signature() {
    let keycache = keys("k1", "e1", 7);
    let compact = sign_token(&keycache, &token(Duration::minutes(1))).await.unwrap();
    let other = sign_token(&keycache, &token(Duration::minutes(5))).await.unwrap();
    let parts: Vec<&str> = compact.split('.').collect();
    let other_parts: Vec<&str> = other.split('.').collect();
    let spliced = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);
    let err = verify_token::<SignedToken>(&keycache, &spliced, &ClaimExpectations::at(NOW))
        .await
        .unwrap_err();
    assert_eq!(err, TokenError::InvalidSignature);
}

#[tokio::test]
async fn unknown_key_id_is_rejected() {
    let signer = keys("k1", "e1", 7);
    let verifier = keys("k2", "e2", 7);
    let compact = sign_token(&signer, &token(Duration::minutes(1))).await.unwrap();
    let err = verify_token::<SignedToken>(&verifier, &compact, &ClaimExpectations::at(NOW))
        .await
        .unwrap_err();
    assert_eq!(err, TokenError::Key(KeyError::UnknownKey("k1".to_string())));
}

#[tokio::test]
async fn retired_signing_key_still_verifies() {
    let old = keys("old", "e1", 1);
    let compact = sign_token(&old, &token(Duration::minutes(1))).await.unwrap();
    let rotated = keys("new", "e1", 2).with_retired_signing_key(SigningKey {
        id: "old".to_string(),
        secret: vec![1; 64],
    });
    let decoded: SignedToken =
        verify_token(&rotated, &compact, &ClaimExpectations::at(NOW)).await.unwrap();
    assert_eq!(decoded.app_url, "http://127.0.0.1:8080");
}

#[tokio::test]
async fn malformed_tokens_are_rejected() {
    let keycache = keys("k1", "e1", 7);
    for bad in ["", "a.b", "a.b.c.d", "a..c", "!!!.###.$$$"] {
        let err = verify_token::<SignedToken>(&keycache, bad, &ClaimExpectations::at(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Malformed(_)), "{bad}: {err:?}");
    }
}

#[tokio::test]
async fn encrypted_api_key_round_trips_with_issuer_and_audience() {
    let keycache = keys("k1", "e1", 9);
    let payload = EncryptedApiKeyPayload::new("abc-def", NOW);
    let sealed = encrypt_payload(&keycache, &payload).await.unwrap();
    assert!(!sealed.contains("abc-def"));

    let expect = ClaimExpectations::at(NOW)
        .with_issuer(API_KEY_ISSUER)
        .with_audience(API_KEY_AUDIENCE);
    let opened: EncryptedApiKeyPayload =
        decrypt_payload(&keycache, &sealed, &expect).await.unwrap();
    assert_eq!(opened.api_key, "abc-def");
}

#[tokio::test]
async fn encrypted_payload_checks_audience_and_time() {
    let keycache = keys("k1", "e1", 9);
    let sealed =
        encrypt_payload(&keycache, &EncryptedApiKeyPayload::new("abc-def", NOW)).await.unwrap();

    let wrong_audience = ClaimExpectations::at(NOW).with_audience("someone-else");
    let err = decrypt_payload::<EncryptedApiKeyPayload>(&keycache, &sealed, &wrong_audience)
        .await
        .unwrap_err();
    assert_eq!(err, TokenError::InvalidAudience);

    let late = ClaimExpectations::at(NOW + Duration::minutes(5));
    let err =
        decrypt_payload::<EncryptedApiKeyPayload>(&keycache, &sealed, &late).await.unwrap_err();
    assert_eq!(err, TokenError::Expired);

    let skewed = ClaimExpectations::at(NOW - Duration::seconds(30));
    assert!(decrypt_payload::<EncryptedApiKeyPayload>(&keycache, &sealed, &skewed).await.is_ok());
}

#[tokio::test]
async fn ciphertext_from_other_key_fails_to_decrypt() {
    let sealer = keys("k1", "e1", 9);
    let sealed =
        encrypt_payload(&sealer, &EncryptedApiKeyPayload::new("abc-def", NOW)).await.unwrap();
    let impostor = keys("k1", "e1", 3);
    let err = decrypt_payload::<EncryptedApiKeyPayload>(&impostor, &sealed, &ClaimExpectations::at(NOW))
        .await
        .unwrap_err();
    assert_eq!(err, TokenError::Decrypt);
}

#[test]
fn token_matches_request_ignoring_trailing_slash() {
    let issued = token(Duration::minutes(1));
    let mut req = Request::path_app("/@alice/dev/apps/code", "alice", "dev", "code").normalize();
    assert!(issued.matches_request(&req));
    req.base_path = "/@alice/dev/apps/code".to_string();
    assert!(issued.matches_request(&req));
    req.app_slug_or_port = "other".to_string();
    assert!(!issued.matches_request(&req));
    assert_eq!(issued.expires_at(), Some(NOW + Duration::minutes(1)));
}

#[test]
fn token_does_not_match_another_access_method() {
    let issued = token(Duration::minutes(1));
    for access_method in [AccessMethod::Subdomain, AccessMethod::Terminal] {
        let mut req = issued.request.clone();
        req.access_method = access_method;
        assert!(!issued.matches_request(&req));
    }
}

#[test]
fn token_does_not_match_another_subdomain_prefix() {
    let issued = token(Duration::minutes(1));
    let mut req = issued.request.clone();
    assert!(issued.matches_request(&req));
    req.prefix = "dev---".to_string();
    assert!(!issued.matches_request(&req));
}
