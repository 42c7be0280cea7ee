//! Segment encryption
//!
//! Provides:
//! - AES-256-CBC with PKCS#7 padding over whole segments
//! - User keys of 1..=32 bytes, zero-padded to 32
//! - An IV derived from the first 16 bytes of the padded key
//!
//! The IV is fixed per key so every client derives identical ciphertext
//! for identical input. Equal plaintext segments under one key therefore
//! encrypt identically.

use crate::error::{CessError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use std::fmt;

/// AES-256 key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// AES block size and CBC IV size (16 bytes)
pub const BLOCK_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Zero-padded AES-256 key
#[derive(Clone)]
pub struct CipherKey([u8; KEY_SIZE]);

impl CipherKey {
    /// Create from user key material (1..=32 bytes)
    pub fn new(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(CessError::EmptyKey);
        }
        if raw.len() > KEY_SIZE {
            return Err(CessError::InvalidKeyLength {
                max: KEY_SIZE,
                actual: raw.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key[..raw.len()].copy_from_slice(raw);
        Ok(Self(key))
    }

    /// Create from an optional passphrase; an empty string means no encryption
    pub fn from_passphrase(passphrase: &str) -> Result<Option<Self>> {
        if passphrase.is_empty() {
            return Ok(None);
        }
        Self::new(passphrase.as_bytes()).map(Some)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn iv(&self) -> &[u8] {
        &self.0[..BLOCK_SIZE]
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}

impl Drop for CipherKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// Encrypt with AES-256-CBC + PKCS#7.
///
/// The output is `plaintext.len()` rounded up to the next full block; an
/// already aligned input grows by exactly one block.
pub fn encrypt(plaintext: &[u8], key: &CipherKey) -> Result<Vec<u8>> {
    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), key.iv())
        .map_err(|e| CessError::Configuration(e.to_string()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt AES-256-CBC + PKCS#7 and strip the padding
pub fn decrypt(ciphertext: &[u8], key: &CipherKey) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CessError::Decryption(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }
    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), key.iv())
        .map_err(|e| CessError::Decryption(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CessError::Decryption("invalid PKCS#7 padding".to_string()))
}
