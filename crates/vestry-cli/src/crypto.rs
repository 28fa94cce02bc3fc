//! Host-side encryption collaborator.
//!
//! The engine only defines the [`Crypto`] boundary; this is the CLI's
//! implementation: AES-256-GCM for payload encryption and BLAKE3 for the
//! conflict-detection digest. The key comes from `VESTRY_ENCRYPTION_KEY`
//! (base64, 32 bytes) or a key file generated next to the database on first
//! run.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use vestry_core::crypto::Crypto;

use crate::error::CliError;

/// AES-GCM nonce length in bytes; prepended to every ciphertext.
const NONCE_LEN: usize = 12;

pub struct HostCrypto {
    cipher: Aes256Gcm,
}

impl HostCrypto {
    /// Resolve the key from the environment or a per-device key file,
    /// generating a fresh key on first run.
    pub fn load(db_path: &Path) -> Result<Self, CliError> {
        if let Ok(encoded) = std::env::var("VESTRY_ENCRYPTION_KEY") {
            return Self::from_encoded_key(encoded.trim());
        }

        let key_path = key_file_path(db_path);
        if key_path.exists() {
            let encoded = std::fs::read_to_string(&key_path)?;
            return Self::from_encoded_key(encoded.trim());
        }

        let key = Aes256Gcm::generate_key(&mut OsRng);
        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&key_path, BASE64.encode(key))?;
        tracing::info!("Generated encryption key at {}", key_path.display());
        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    /// Build from a base64-encoded 32-byte key.
    pub fn from_encoded_key(encoded: &str) -> Result<Self, CliError> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|error| CliError::EncryptionKey(format!("key is not base64: {error}")))?;
        if bytes.len() != 32 {
            return Err(CliError::EncryptionKey(format!(
                "key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes)),
        })
    }
}

impl Crypto for HostCrypto {
    fn encrypt(&self, plaintext: &str) -> vestry_core::Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| vestry_core::Error::Crypto("encryption failed".into()))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(combined))
    }

    fn decrypt(&self, ciphertext: &str) -> vestry_core::Result<String> {
        let combined = BASE64
            .decode(ciphertext)
            .map_err(|error| vestry_core::Error::Crypto(format!("bad ciphertext: {error}")))?;
        if combined.len() < NONCE_LEN {
            return Err(vestry_core::Error::Crypto("ciphertext too short".into()));
        }

        let (nonce, payload) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| vestry_core::Error::Crypto("decryption failed".into()))?;
        String::from_utf8(plaintext)
            .map_err(|error| vestry_core::Error::Crypto(format!("bad plaintext utf8: {error}")))
    }

    fn hash(&self, input: &str) -> String {
        blake3::hash(input.as_bytes()).to_hex().to_string()
    }
}

fn key_file_path(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        .join("vestry.key")
}
