//! Encryption collaborator boundary.
//!
//! The engine never implements cryptographic primitives. Host applications
//! supply a [`Crypto`] implementation; the engine routes sensitive payloads
//! through it on every write and read, and uses its digest function to gate
//! conflict detection.

use serde_json::Value;

use crate::error::Result;

/// External crypto collaborator.
///
/// `decrypt` may fail for a single record (key rotation, disk corruption);
/// callers treat that as loss of the one record, never of the store.
pub trait Crypto: Send + Sync {
    /// Encrypt a serialized payload into an opaque ciphertext string.
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// Decrypt a ciphertext produced by [`Crypto::encrypt`].
    fn decrypt(&self, ciphertext: &str) -> Result<String>;

    /// Deterministic digest of the input, hex-encoded.
    fn hash(&self, input: &str) -> String;
}

/// Canonical serialization used as the digest input.
///
/// `serde_json` maps are key-sorted by default, so two structurally equal
/// payloads always serialize to the same byte sequence.
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// Checksum of a canonical (decrypted) payload.
pub fn checksum_of(crypto: &dyn Crypto, payload: &Value) -> String {
    crypto.hash(&canonical_json(payload))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use crate::error::{Error, Result};

    use super::Crypto;

    const PREFIX: &str = "enc:";

    /// Reversible toy cipher for tests: XOR with a fixed byte, hex-encoded
    /// behind a marker prefix so routing mistakes surface as parse errors.
    pub(crate) struct TestCrypto {
        pub fail_encrypt: bool,
        pub fail_decrypt: bool,
    }

    impl TestCrypto {
        pub(crate) const fn new() -> Self {
            Self {
                fail_encrypt: false,
                fail_decrypt: false,
            }
        }
    }

    impl Crypto for TestCrypto {
        fn encrypt(&self, plaintext: &str) -> Result<String> {
            if self.fail_encrypt {
                return Err(Error::Crypto("test encrypt failure".into()));
            }
            let hex: String = plaintext
                .as_bytes()
                .iter()
                .map(|byte| format!("{:02x}", byte ^ 0x5a))
                .collect();
            Ok(format!("{PREFIX}{hex}"))
        }

        fn decrypt(&self, ciphertext: &str) -> Result<String> {
            if self.fail_decrypt {
                return Err(Error::Crypto("test decrypt failure".into()));
            }
            let hex = ciphertext
                .strip_prefix(PREFIX)
                .ok_or_else(|| Error::Crypto("missing ciphertext marker".into()))?;
            let bytes = (0..hex.len())
                .step_by(2)
                .map(|i| {
                    u8::from_str_radix(&hex[i..i + 2], 16)
                        .map(|byte| byte ^ 0x5a)
                        .map_err(|_| Error::Crypto("bad ciphertext hex".into()))
                })
                .collect::<Result<Vec<u8>>>()?;
            String::from_utf8(bytes).map_err(|_| Error::Crypto("bad ciphertext utf8".into()))
        }

        fn hash(&self, input: &str) -> String {
            let mut hasher = DefaultHasher::new();
            input.hash(&mut hasher);
            format!("{:016x}", hasher.finish())
        }
    }

    #[test]
    fn test_crypto_round_trip() {
        let crypto = TestCrypto::new();
        let ciphertext = crypto.encrypt("hello").unwrap();
        assert_ne!(ciphertext, "hello");
        assert_eq!(crypto.decrypt(&ciphertext).unwrap(), "hello");
    }

    #[test]
    fn test_crypto_hash_deterministic() {
        let crypto = TestCrypto::new();
        assert_eq!(crypto.hash("abc"), crypto.hash("abc"));
        assert_ne!(crypto.hash("abc"), crypto.hash("abd"));
    }
}
