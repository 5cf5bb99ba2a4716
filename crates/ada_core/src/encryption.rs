use std::path::Path;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use rand::Rng;

const KEY_ENV_VAR: &str = "ADA_PREFS_KEY";

/// Resolve the preference encryption key.
/// Priority: environment variable, then the key file; a missing key file is
/// created with a fresh random key so stored values survive restarts.
pub fn load_or_create_key(key_path: &Path) -> Result<Vec<u8>> {
    if let Ok(key_hex) = std::env::var(KEY_ENV_VAR) {
        if let Ok(key) = hex::decode(key_hex.trim()) {
            if key.len() == 32 {
                return Ok(key);
            }
        }
        log::warn!("{KEY_ENV_VAR} is not 32 bytes of hex, falling back to key file");
    }

    if key_path.exists() {
        let key_hex = std::fs::read_to_string(key_path)?;
        let key = hex::decode(key_hex.trim()).map_err(|e| anyhow!("Invalid key file: {e}"))?;
        if key.len() != 32 {
            return Err(anyhow!("Key file does not hold a 32-byte key"));
        }
        return Ok(key);
    }

    let key: [u8; 32] = rand::thread_rng().gen();
    if let Some(parent) = key_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(key_path, hex::encode(key))?;
    Ok(key.to_vec())
}

/// Encrypt a value.
/// Format: hex(nonce) + ":" + hex(ciphertext)
pub fn encrypt(key: &[u8], plaintext: &str) -> Result<String> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {e}"))?;

    let nonce_bytes: [u8; 12] = rand::thread_rng().gen();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {e}"))?;

    Ok(format!(
        "{}:{}",
        hex::encode(nonce_bytes),
        hex::encode(ciphertext)
    ))
}

/// Decrypt a value produced by [`encrypt`].
pub fn decrypt(key: &[u8], encrypted: &str) -> Result<String> {
    let parts: Vec<&str> = encrypted.split(':').collect();
    if parts.len() != 2 {
        return Err(anyhow!("Invalid encrypted format"));
    }

    let nonce_bytes = hex::decode(parts[0]).map_err(|e| anyhow!("Invalid nonce: {e}"))?;
    if nonce_bytes.len() != 12 {
        return Err(anyhow!("Invalid nonce length: {}", nonce_bytes.len()));
    }
    let ciphertext = hex::decode(parts[1]).map_err(|e| anyhow!("Invalid ciphertext: {e}"))?;

    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {e}"))?;

    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| anyhow!("Decryption failed: {e}"))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let dir = tempdir().unwrap();
        let key = load_or_create_key(&dir.path().join(".prefs_key")).unwrap();
        let encrypted = encrypt(&key, "my_secret_token").unwrap();
        assert_ne!(encrypted, "my_secret_token");
        assert_eq!(decrypt(&key, &encrypted).unwrap(), "my_secret_token");
    }

    #[test]
    fn key_file_is_stable_across_loads() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join(".prefs_key");
        let first = load_or_create_key(&key_path).unwrap();
        let second = load_or_create_key(&key_path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn decrypt_rejects_malformed_input() {
        let dir = tempdir().unwrap();
        let key = load_or_create_key(&dir.path().join(".prefs_key")).unwrap();
        assert!(decrypt(&key, "not-hex-at-all").is_err());
        assert!(decrypt(&key, "abcd:zz").is_err());
        // Valid hex but not a 12-byte nonce must error, not panic.
        assert!(decrypt(&key, "abcd:abcd").is_err());
        assert!(decrypt(&key, &format!("{}:abcd", "00".repeat(16))).is_err());
    }
}
