use std::collections::HashMap;
use std::sync::Mutex;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CipherError;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Symmetric encryption of one record's plaintext.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError>;
}

/// Byte to text encoding of the sealed record.
pub trait Encoder: Send + Sync {
    fn encode(&self, bytes: &[u8]) -> String;
    fn decode(&self, text: &str) -> Result<Vec<u8>, CipherError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests; never use for real records.
    pub fn insecure_fast() -> Self {
        Self {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

pub fn derive_key_with_params(
    password: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CipherError> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| CipherError::Kdf(format!("invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| CipherError::Kdf(e.to_string()))?;
    Ok(key)
}

/// Argon2id + ChaCha20-Poly1305 keyed by the repository password.
///
/// Sealed layout: `salt | nonce | ciphertext`. Every record carries its own
/// salt so a record stays readable on its own; keys derived during the session
/// are cached by salt.
pub struct PasswordCipher {
    password: Zeroizing<String>,
    params: KdfParams,
    salt: [u8; SALT_LEN],
    keys: Mutex<HashMap<[u8; SALT_LEN], Zeroizing<[u8; KEY_LEN]>>>,
}

impl PasswordCipher {
    pub fn new(password: &str) -> Self {
        Self::with_params(password, KdfParams::default())
    }

    pub fn with_params(password: &str, params: KdfParams) -> Self {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        Self {
            password: Zeroizing::new(password.to_string()),
            params,
            salt,
            keys: Mutex::new(HashMap::new()),
        }
    }

    fn key_for(&self, salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>, CipherError> {
        let mut keys = self.keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(key) = keys.get(salt) {
            return Ok(key.clone());
        }
        let key = derive_key_with_params(&self.password, salt, self.params)?;
        keys.insert(*salt, key.clone());
        Ok(key)
    }
}

impl Cipher for PasswordCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = self.key_for(&self.salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut sealed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&self.salt);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        if sealed.len() < SALT_LEN + NONCE_LEN {
            return Err(CipherError::Decrypt);
        }
        let (salt, rest) = sealed.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| CipherError::Decrypt)?;

        let key = self.key_for(&salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CipherError::Decrypt)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Base64Encoder;

impl Encoder for Base64Encoder {
    fn encode(&self, bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, CipherError> {
        base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|_| CipherError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_opens_sealed_bytes() {
        let cipher = PasswordCipher::with_params("hunter2", KdfParams::insecure_fast());
        let sealed = cipher.encrypt(b"user: bob\npassword: x\n").unwrap();
        let opened = cipher.decrypt(&sealed).unwrap();
        assert_eq!(opened.as_slice(), b"user: bob\npassword: x\n");
    }

    #[test]
    fn another_session_with_same_password_opens_record() {
        let writer = PasswordCipher::with_params("hunter2", KdfParams::insecure_fast());
        let reader = PasswordCipher::with_params("hunter2", KdfParams::insecure_fast());
        let sealed = writer.encrypt(b"abc").unwrap();
        assert_eq!(reader.decrypt(&sealed).unwrap().as_slice(), b"abc");
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let writer = PasswordCipher::with_params("right", KdfParams::insecure_fast());
        let reader = PasswordCipher::with_params("wrong", KdfParams::insecure_fast());
        let sealed = writer.encrypt(b"secret").unwrap();
        assert!(matches!(reader.decrypt(&sealed), Err(CipherError::Decrypt)));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let cipher = PasswordCipher::with_params("pw", KdfParams::insecure_fast());
        assert!(matches!(cipher.decrypt(&[1, 2, 3]), Err(CipherError::Decrypt)));
    }

    #[test]
    fn base64_rejects_garbage() {
        let encoder = Base64Encoder;
        let text = encoder.encode(&[0, 159, 146, 150]);
        assert_eq!(encoder.decode(&text).unwrap(), vec![0, 159, 146, 150]);
        assert!(encoder.decode("not base64 !!").is_err());
    }
}
