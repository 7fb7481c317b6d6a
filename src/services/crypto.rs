// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential cipher for encrypting OAuth credentials at rest.
//!
//! AES-256-GCM with a key derived (HKDF-SHA256) from the process-wide
//! configuration key. Every ciphertext is bound to its user id via AAD, so a
//! payload copied between rows fails to decrypt.

use crate::error::AppError;
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::sync::Arc;

/// HKDF context label; bump the suffix if the payload format ever changes.
const KEY_CONTEXT: &[u8] = b"sheetfin-credential-cipher-v1";

/// Symmetric cipher for credential payloads.
#[derive(Clone)]
pub struct TokenCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl TokenCipher {
    /// Derive the AEAD key from configured key material.
    pub fn new(key_material: &[u8]) -> Result<Self, AppError> {
        let hk = Hkdf::<Sha256>::new(None, key_material);
        let mut okm = [0u8; 32];
        hk.expand(KEY_CONTEXT, &mut okm)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("HKDF expansion failed")))?;

        let unbound = UnboundKey::new(&AES_256_GCM, &okm)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("AEAD key construction failed")))?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a credential payload for `user_id`.
    ///
    /// Output layout: 12-byte nonce || ciphertext || tag.
    pub fn seal(&self, user_id: &str, plaintext: &str) -> Result<Vec<u8>, AppError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("nonce generation failed")))?;

        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::from(aad_for(user_id)), &mut in_out)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("credential encryption failed")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    /// Decrypt a credential payload for `user_id`.
    ///
    /// Any failure (wrong key, wrong user, truncated or tampered blob) is one
    /// opaque error; callers treat the stored row as corrupted.
    pub fn open(&self, user_id: &str, blob: &[u8]) -> Result<String, AppError> {
        if blob.len() <= NONCE_LEN {
            return Err(decrypt_error());
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| decrypt_error())?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(aad_for(user_id)), &mut in_out)
            .map_err(|_| decrypt_error())?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| decrypt_error())
    }
}

fn aad_for(user_id: &str) -> Vec<u8> {
    format!("user:{}", user_id).into_bytes()
}

fn decrypt_error() -> AppError {
    AppError::Internal(anyhow::anyhow!("credential payload cannot be decrypted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::new(&[0x5a; 32]).expect("cipher")
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let c = cipher();
        let blob = c.seal("12345", "secret_payload").unwrap();
        assert_ne!(blob, b"secret_payload");
        assert_eq!(c.open("12345", &blob).unwrap(), "secret_payload");
    }

    #[test]
    fn test_open_with_wrong_user_fails() {
        let c = cipher();
        let blob = c.seal("12345", "secret_payload").unwrap();
        assert!(c.open("99999", &blob).is_err());
    }

    #[test]
    fn test_open_tampered_blob_fails() {
        let c = cipher();
        let mut blob = c.seal("12345", "secret_payload").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(c.open("12345", &blob).is_err());
    }

    #[test]
    fn test_open_truncated_blob_fails() {
        let c = cipher();
        assert!(c.open("12345", &[0u8; 4]).is_err());
    }

    #[test]
    fn test_nonces_are_unique_per_seal() {
        let c = cipher();
        let a = c.seal("1", "same").unwrap();
        let b = c.seal("1", "same").unwrap();
        assert_ne!(a, b);
    }
}
