//! Encryption-at-rest for sensitive columns (EnvVar values, OAuth refresh
//! tokens, vault client tokens — §3, §4.2) and the narrow adaptor onto the
//! secret vault that supplies the symmetric key at startup.
//!
//! Grounded on the teacher's `server/encryption/{mod.rs, providers/local.rs}`:
//! an `EncryptionProvider` trait so a KMS-backed implementation can be
//! dropped in later without touching call sites.

#![cfg(feature = "server")]

use crate::error::{Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use rand::RngCore;

#[async_trait]
pub trait EncryptionProvider: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// A single-file/env-var secret source. Production deployments point this at
/// a real vault; this adaptor is intentionally the only thing that knows the
/// difference (§1: "consumed via narrow adaptors").
pub trait SecretSource: Send + Sync {
    fn get(&self, key: &str) -> Result<String>;
}

pub struct EnvSecretSource;

impl SecretSource for EnvSecretSource {
    fn get(&self, key: &str) -> Result<String> {
        std::env::var(key).map_err(|_| Error::internal(format!("secret '{key}' is not set")))
    }
}

/// AES-256-GCM with a random 96-bit nonce prepended to each ciphertext.
pub struct LocalEncryptionProvider {
    cipher: Aes256Gcm,
}

impl LocalEncryptionProvider {
    /// `key_b64` must decode to exactly 32 bytes.
    pub fn new(key_b64: &str) -> anyhow::Result<Self> {
        use base64::Engine;
        let key_bytes = base64::engine::general_purpose::STANDARD.decode(key_b64)?;
        if key_bytes.len() != 32 {
            anyhow::bail!(
                "encryption key must decode to 32 bytes, got {}",
                key_bytes.len()
            );
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }
}

#[async_trait]
impl EncryptionProvider for LocalEncryptionProvider {
    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::internal(format!("encryption failed: {e}")))?;
        let mut out = nonce_bytes.to_vec();
        out.append(&mut ciphertext);
        Ok(out)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 12 {
            return Err(Error::internal("ciphertext too short"));
        }
        let (nonce_bytes, body) = ciphertext.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, body)
            .map_err(|e| Error::internal(format!("decryption failed: {e}")))
    }
}

/// Runs a round-trip at startup so a bad key fails fast instead of surfacing
/// as opaque decrypt errors later (grounded on the teacher's
/// `test_encryption_provider` startup check in `state.rs`).
pub async fn self_test(provider: &dyn EncryptionProvider) -> Result<()> {
    let probe = b"enclii-encryption-self-test";
    let ciphertext = provider.encrypt(probe).await?;
    let roundtrip = provider.decrypt(&ciphertext).await?;
    if roundtrip != probe {
        return Err(Error::internal("encryption self-test round-trip mismatch"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> LocalEncryptionProvider {
        use base64::Engine;
        let key = [7u8; 32];
        let key_b64 = base64::engine::general_purpose::STANDARD.encode(key);
        LocalEncryptionProvider::new(&key_b64).unwrap()
    }

    #[tokio::test]
    async fn round_trips() {
        let provider = test_provider();
        let ciphertext = provider.encrypt(b"super-secret-value").await.unwrap();
        assert_ne!(ciphertext, b"super-secret-value".to_vec());
        let plaintext = provider.decrypt(&ciphertext).await.unwrap();
        assert_eq!(plaintext, b"super-secret-value".to_vec());
    }

    #[tokio::test]
    async fn rejects_truncated_ciphertext() {
        let provider = test_provider();
        assert!(provider.decrypt(&[1, 2, 3]).await.is_err());
    }

    #[tokio::test]
    async fn self_test_passes_for_valid_key() {
        let provider = test_provider();
        assert!(self_test(&provider).await.is_ok());
    }
}
