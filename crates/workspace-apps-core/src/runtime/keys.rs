// crates/workspace-apps-core/src/runtime/keys.rs
// ============================================================================
// Module: Static Keycache
// Description: Fixed signing and encryption keys with retired-key verification.
// Purpose: Serve key material when no rotation service is deployed.
// Dependencies: async-trait, rand
// ============================================================================

//! ## Overview
//! [`StaticKeycache`] holds one active key per purpose plus any retired keys
//! that are still accepted for verification or decryption. Control plane and
//! proxies must be configured with the same keys.

use async_trait::async_trait;
use rand::RngCore;

use crate::interfaces::EncryptionKey;
use crate::interfaces::EncryptionKeycache;
use crate::interfaces::KeyError;
use crate::interfaces::SigningKey;
use crate::interfaces::SigningKeycache;

/// Length of generated signing secrets in bytes.
const GENERATED_SIGNING_SECRET_LENGTH: usize = 64;

/// Keycache over a fixed set of keys.
#[derive(Debug, Clone)]
pub struct StaticKeycache {
    /// Active signing key.
    signing: SigningKey,
    /// Retired signing keys still accepted for verification.
    retired_signing: Vec<SigningKey>,
    /// Active encryption key.
    encryption: EncryptionKey,
    /// Retired encryption keys still accepted for decryption.
    retired_encryption: Vec<EncryptionKey>,
}

impl StaticKeycache {
    /// Creates a keycache with the given active keys.
    #[must_use]
    pub const fn new(signing: SigningKey, encryption: EncryptionKey) -> Self {
        Self {
            signing,
            retired_signing: Vec::new(),
            encryption,
            retired_encryption: Vec::new(),
        }
    }

    /// Creates a keycache with freshly generated random keys.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut signing_secret = vec![0_u8; GENERATED_SIGNING_SECRET_LENGTH];
        rng.fill_bytes(&mut signing_secret);
        let mut encryption_secret = [0_u8; 32];
        rng.fill_bytes(&mut encryption_secret);
        Self::new(
            SigningKey {
                id: random_key_id(),
                secret: signing_secret,
            },
            EncryptionKey {
                id: random_key_id(),
                secret: encryption_secret,
            },
        )
    }

    /// Returns copies of the active signing and encryption keys.
    #[must_use]
    pub fn active_keys(&self) -> (SigningKey, EncryptionKey) {
        (self.signing.clone(), self.encryption.clone())
    }

    /// Keeps accepting tokens signed with a retired key.
    #[must_use]
    pub fn with_retired_signing_key(mut self, key: SigningKey) -> Self {
        self.retired_signing.push(key);
        self
    }

    /// Keeps accepting payloads encrypted with a retired key.
    #[must_use]
    pub fn with_retired_encryption_key(mut self, key: EncryptionKey) -> Self {
        self.retired_encryption.push(key);
        self
    }
}

#[async_trait]
impl SigningKeycache for StaticKeycache {
    async fn signing_key(&self) -> Result<SigningKey, KeyError> {
        Ok(self.signing.clone())
    }

    async fn verifying_key(&self, id: &str) -> Result<SigningKey, KeyError> {
        std::iter::once(&self.signing)
            .chain(self.retired_signing.iter())
            .find(|key| key.id == id)
            .cloned()
            .ok_or_else(|| KeyError::UnknownKey(id.to_string()))
    }
}

#[async_trait]
impl EncryptionKeycache for StaticKeycache {
    async fn encrypting_key(&self) -> Result<EncryptionKey, KeyError> {
        Ok(self.encryption.clone())
    }

    async fn decrypting_key(&self, id: &str) -> Result<EncryptionKey, KeyError> {
        std::iter::once(&self.encryption)
            .chain(self.retired_encryption.iter())
            .find(|key| key.id == id)
            .cloned()
            .ok_or_else(|| KeyError::UnknownKey(id.to_string()))
    }
}

/// Random hex key identifier.
fn random_key_id() -> String {
    let bytes: [u8; 8] = rand::random();
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
