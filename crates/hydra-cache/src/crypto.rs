// SPDX-License-Identifier: MIT
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use hydra_common::HydraError;
use rand::RngCore;
use serde::{Deserialize, Serialize};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// On-disk shape for an encrypted L2 entry, matching the persisted schema:
/// `{encrypted: true, iv, tag, data}`, each of iv/tag/data base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub encrypted: bool,
    pub iv: String,
    pub tag: String,
    pub data: String,
}

pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<EncryptedPayload, HydraError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut combined = cipher.encrypt(nonce, plaintext).map_err(|e| HydraError::Cache {
        message: format!("encryption failed: {e}"),
    })?;
    if combined.len() < TAG_LEN {
        return Err(HydraError::Cache {
            message: "ciphertext shorter than AEAD tag".to_string(),
        });
    }
    let tag = combined.split_off(combined.len() - TAG_LEN);
    Ok(EncryptedPayload {
        encrypted: true,
        iv: B64.encode(nonce_bytes),
        tag: B64.encode(tag),
        data: B64.encode(combined),
    })
}

pub fn decrypt(key: &[u8; 32], payload: &EncryptedPayload) -> Result<Vec<u8>, HydraError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce_bytes = B64.decode(&payload.iv).map_err(|e| HydraError::Cache {
        message: format!("invalid iv encoding: {e}"),
    })?;
    let mut data = B64.decode(&payload.data).map_err(|e| HydraError::Cache {
        message: format!("invalid data encoding: {e}"),
    })?;
    let tag = B64.decode(&payload.tag).map_err(|e| HydraError::Cache {
        message: format!("invalid tag encoding: {e}"),
    })?;
    data.extend_from_slice(&tag);
    let nonce = Nonce::from_slice(&nonce_bytes);
    cipher
        .decrypt(nonce, data.as_ref())
        .map_err(|e| HydraError::Cache {
            message: format!("decryption failed: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn round_trips_plaintext() {
        let key = test_key();
        let plaintext = b"the quick brown fox";
        let payload = encrypt(&key, plaintext).unwrap();
        assert!(payload.encrypted);
        let decoded = decrypt(&key, &payload).unwrap();
        assert_eq!(decoded, plaintext);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let payload = encrypt(&test_key(), b"secret").unwrap();
        let wrong = [9u8; 32];
        assert!(decrypt(&wrong, &payload).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let mut payload = encrypt(&test_key(), b"secret").unwrap();
        payload.data = B64.encode(b"not the real ciphertext!");
        assert!(decrypt(&test_key(), &payload).is_err());
    }
}
