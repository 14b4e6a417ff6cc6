// crates/workspace-apps-core/src/runtime/jwt.rs
// ============================================================================
// Module: Token Crypto
// Description: Compact HS512 signing and AES-256-GCM envelopes with key IDs.
// Purpose: Sign and verify app tokens; encrypt and decrypt API key payloads.
// Dependencies: aes-gcm, base64, jsonwebtoken, rand, serde_json
// ============================================================================

//! ## Overview
//! Signed tokens are HS512 JWS compact tokens built with `jsonwebtoken`,
//! header `{"alg":"HS512","kid":...}`. The `kid` selects the verifying key;
//! issuer and audience are enforced by the JWS validation, while `exp` and
//! `nbf` are checked against the caller's clock. Encrypted payloads use
//! `base64url(header).base64url(nonce).base64url(ciphertext)` with header
//! `{"alg":"dir","enc":"A256GCM","kid":...}`, where the encoded header is the
//! associated data. Registered claims are checked without leeway.
//!
//! Security posture: token strings are attacker-controlled; every segment is
//! length- and format-checked before any key lookup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use aes_gcm::aead::Payload;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use jsonwebtoken::errors::ErrorKind;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::token::Claims;
use crate::core::token::RegisteredClaims;
use crate::interfaces::EncryptionKeycache;
use crate::interfaces::KeyError;
use crate::interfaces::SigningKeycache;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Signature algorithm.
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;
/// Key management label for direct symmetric encryption.
const ENCRYPTION_ALGORITHM: &str = "dir";
/// Content encryption label.
const CONTENT_ENCRYPTION: &str = "A256GCM";
/// AES-GCM nonce length in bytes.
const NONCE_LENGTH: usize = 12;
/// Upper bound on accepted token length.
const MAX_TOKEN_LENGTH: usize = 16 * 1024;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Encrypted payload header.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    /// Key management algorithm.
    alg: String,
    /// Content encryption.
    enc: String,
    /// Key identifier.
    kid: String,
}

/// Expected values for registered claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimExpectations {
    /// Evaluation time.
    pub now: OffsetDateTime,
    /// Required issuer, if any.
    pub issuer: Option<String>,
    /// Required audience, if any.
    pub audience: Option<String>,
}

impl ClaimExpectations {
    /// Expects only time validity at `now`.
    #[must_use]
    pub const fn at(now: OffsetDateTime) -> Self {
        Self {
            now,
            issuer: None,
            audience: None,
        }
    }

    /// Also requires the given issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Also requires the given audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// JWS validation for the issuer and audience expectations.
    ///
    /// Time claims are left to [`ClaimExpectations::validate`] so they are
    /// evaluated at `now` instead of the wall clock.
    fn jws_validation(&self) -> Validation {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }
        validation
    }

    /// Checks registered claims against these expectations.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`TokenError`] claim check.
    pub fn validate(&self, claims: &RegisteredClaims) -> Result<(), TokenError> {
        let now = self.now.unix_timestamp();
        if claims.exp.is_some_and(|exp| now > exp) {
            return Err(TokenError::Expired);
        }
        if claims.nbf.is_some_and(|nbf| nbf > now) {
            return Err(TokenError::NotYetValid);
        }
        if let Some(issuer) = &self.issuer
            && claims.iss.as_deref() != Some(issuer.as_str())
        {
            return Err(TokenError::InvalidIssuer);
        }
        if let Some(audience) = &self.audience
            && claims.aud.as_deref() != Some(audience.as_str())
        {
            return Err(TokenError::InvalidAudience);
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Signing
// ============================================================================

/// Signs `claims` with the keycache's active signing key.
///
/// # Errors
///
/// Returns [`TokenError`] when encoding fails or no signing key is available.
pub async fn sign_token<T: Serialize>(
    keycache: &dyn SigningKeycache,
    claims: &T,
) -> Result<String, TokenError> {
    let key = keycache.signing_key().await?;
    let mut header = Header::new(SIGNING_ALGORITHM);
    header.typ = None;
    header.kid = Some(key.id.clone());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(&key.secret))
        .map_err(|err| TokenError::Encode(err.to_string()))
}

/// Verifies a signed token and returns its decoded body.
///
/// # Errors
///
/// Returns [`TokenError`] for malformed input, unknown keys, bad signatures,
/// and failed claim checks.
pub async fn verify_token<T: DeserializeOwned + Claims>(
    keycache: &dyn SigningKeycache,
    token: &str,
    expect: &ClaimExpectations,
) -> Result<T, TokenError> {
    split_compact(token)?;
    let header = jsonwebtoken::decode_header(token).map_err(jws_error)?;
    if header.alg != SIGNING_ALGORITHM {
        return Err(TokenError::UnsupportedAlgorithm(algorithm_name(header.alg)));
    }
    let kid = header.kid.ok_or_else(|| TokenError::Malformed("missing kid".to_string()))?;
    let key = keycache.verifying_key(&kid).await?;
    let data = jsonwebtoken::decode::<T>(
        token,
        &DecodingKey::from_secret(&key.secret),
        &expect.jws_validation(),
    )
    .map_err(jws_error)?;
    expect.validate(data.claims.registered())?;
    Ok(data.claims)
}

// ============================================================================
// SECTION: Encryption
// ============================================================================

/// Encrypts `payload` with the keycache's active encryption key.
///
/// # Errors
///
/// Returns [`TokenError`] when encoding or encryption fails.
pub async fn encrypt_payload<T: Serialize>(
    keycache: &dyn EncryptionKeycache,
    payload: &T,
) -> Result<String, TokenError> {
    let plaintext =
        serde_json::to_vec(payload).map_err(|err| TokenError::Encode(err.to_string()))?;
    let key = keycache.encrypting_key().await?;
    let header = encode_json(&EnvelopeHeader {
        alg: ENCRYPTION_ALGORITHM.to_string(),
        enc: CONTENT_ENCRYPTION.to_string(),
        kid: key.id.clone(),
    })?;
    let nonce: [u8; NONCE_LENGTH] = rand::random();
    let cipher =
        <Aes256Gcm as KeyInit>::new_from_slice(&key.secret).map_err(|err| TokenError::Crypto(err.to_string()))?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &plaintext,
                aad: header.as_bytes(),
            },
        )
        .map_err(|_| TokenError::Crypto("encryption failed".to_string()))?;
    Ok(format!(
        "{header}.{}.{}",
        URL_SAFE_NO_PAD.encode(nonce),
        URL_SAFE_NO_PAD.encode(ciphertext)
    ))
}

/// Decrypts an encrypted payload and checks its registered claims.
///
/// # Errors
///
/// Returns [`TokenError`] for malformed input, unknown keys, failed
/// authentication, and failed claim checks.
pub async fn decrypt_payload<T: DeserializeOwned + Claims>(
    keycache: &dyn EncryptionKeycache,
    token: &str,
    expect: &ClaimExpectations,
) -> Result<T, TokenError> {
    let [header_segment, nonce_segment, ciphertext_segment] = split_compact(token)?;
    let header: EnvelopeHeader = decode_json(header_segment)?;
    if header.alg != ENCRYPTION_ALGORITHM || header.enc != CONTENT_ENCRYPTION {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    }
    let nonce = decode_segment(nonce_segment)?;
    if nonce.len() != NONCE_LENGTH {
        return Err(TokenError::Malformed("nonce length".to_string()));
    }
    let ciphertext = decode_segment(ciphertext_segment)?;
    let key = keycache.decrypting_key(&header.kid).await?;
    let cipher =
        <Aes256Gcm as KeyInit>::new_from_slice(&key.secret).map_err(|err| TokenError::Crypto(err.to_string()))?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &ciphertext,
                aad: header_segment.as_bytes(),
            },
        )
        .map_err(|_| TokenError::Decrypt)?;
    let body: T = serde_json::from_slice(&plaintext)
        .map_err(|err| TokenError::Malformed(format!("payload: {err}")))?;
    expect.validate(body.registered())?;
    Ok(body)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Splits a compact token into exactly three segments.
fn split_compact(token: &str) -> Result<[&str; 3], TokenError> {
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(TokenError::Malformed("token too long".to_string()));
    }
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(second), Some(third), None)
            if !first.is_empty() && !second.is_empty() && !third.is_empty() =>
        {
            Ok([first, second, third])
        }
        _ => Err(TokenError::Malformed("expected three segments".to_string())),
    }
}

/// Decodes a base64url segment.
fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|err| TokenError::Malformed(err.to_string()))
}

/// Decodes a base64url JSON segment.
fn decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = decode_segment(segment)?;
    serde_json::from_slice(&bytes).map_err(|err| TokenError::Malformed(err.to_string()))
}

/// Maps `jsonwebtoken` failures onto [`TokenError`].
fn jws_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm("algorithm mismatch".to_string()),
        ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
        ErrorKind::InvalidAudience => TokenError::InvalidAudience,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        ErrorKind::InvalidKeyFormat => TokenError::Crypto(err.to_string()),
        _ => TokenError::Malformed(err.to_string()),
    }
}

/// Registered name of a JWS algorithm, for error messages.
fn algorithm_name(algorithm: Algorithm) -> String {
    serde_json::to_value(algorithm)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Encodes a value as a base64url JSON segment.
fn encode_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let bytes = serde_json::to_vec(value).map_err(|err| TokenError::Encode(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Token signing, verification, and envelope errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token is structurally invalid.
    #[error("malformed token: {0}")]
    Malformed(String),
    /// Header names an algorithm this module does not accept.
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Key lookup failed.
    #[error("token key lookup failed: {0}")]
    Key(#[from] KeyError),
    /// Signature does not verify.
    #[error("invalid token signature")]
    InvalidSignature,
    /// Ciphertext does not authenticate.
    #[error("token decryption failed")]
    Decrypt,
    /// `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// `nbf` is in the future.
    #[error("token not yet valid")]
    NotYetValid,
    /// `iss` mismatch.
    #[error("invalid token issuer")]
    InvalidIssuer,
    /// `aud` mismatch.
    #[error("invalid token audience")]
    InvalidAudience,
    /// Body could not be encoded.
    #[error("token encoding failed: {0}")]
    Encode(String),
    /// Primitive construction failed.
    #[error("token crypto failure: {0}")]
    Crypto(String),
}
