//! Secret handling
//!
//! Two concerns live here: the fixed mask that replaces secrets in any
//! externalized form, and the AEAD layer that encrypts the sensitive leaves
//! of a database's `encrypted_extra` JSON at rest. Secrets never reach logs;
//! callers log redacted URIs only.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::Value;
use thiserror::Error;

/// Fixed sentinel replacing secrets in exported documents. An import-time
/// side-channel must supply the real value.
pub const PASSWORD_MASK: &str = "XXXXXXXXXX";

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed")]
    Decrypt,

    #[error("Ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Invalid JSON in encrypted extra: {0}")]
    Json(#[from] serde_json::Error),
}

/// AES-256-GCM cipher over the host-supplied symmetric key.
pub struct SecretCipher {
    key: [u8; 32],
    rng: SystemRandom,
}

impl SecretCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self {
            key,
            rng: SystemRandom::new(),
        }
    }

    fn sealing_key(&self) -> Result<LessSafeKey, SecretsError> {
        UnboundKey::new(&AES_256_GCM, &self.key)
            .map(LessSafeKey::new)
            .map_err(|_| SecretsError::Encrypt)
    }

    /// Encrypt to base64(`nonce || ciphertext || tag`).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SecretsError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| SecretsError::Encrypt)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut buffer = plaintext.as_bytes().to_vec();
        self.sealing_key()?
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| SecretsError::Encrypt)?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&buffer);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, SecretsError> {
        let raw = BASE64.decode(ciphertext)?;
        if raw.len() < NONCE_LEN {
            return Err(SecretsError::Decrypt);
        }
        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| SecretsError::Decrypt)?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .sealing_key()
            .map_err(|_| SecretsError::Decrypt)?
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| SecretsError::Decrypt)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| SecretsError::Decrypt)
    }
}

fn lookup_path<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get_mut(segment)?;
    }
    Some(current)
}

/// Replace the leaves at the given dot-paths with [`PASSWORD_MASK`].
/// Missing paths are skipped; only engine specs know which paths exist.
pub fn mask_sensitive_fields(extra_json: &str, paths: &[&str]) -> Result<String, SecretsError> {
    let mut root: Value = serde_json::from_str(extra_json)?;
    for path in paths {
        if let Some(leaf) = lookup_path(&mut root, path) {
            *leaf = Value::String(PASSWORD_MASK.to_string());
        }
    }
    Ok(serde_json::to_string(&root)?)
}

/// Restore masked leaves from a previously persisted document. Where the new
/// document carries the mask and the old one has a real value, the old value
/// wins; everything else in the new document is kept.
pub fn merge_masked_fields(
    new_json: &str,
    old_json: &str,
    paths: &[&str],
) -> Result<String, SecretsError> {
    let mut new_root: Value = serde_json::from_str(new_json)?;
    let mut old_root: Value = serde_json::from_str(old_json)?;
    for path in paths {
        let masked = lookup_path(&mut new_root, path)
            .map(|leaf| leaf.as_str() == Some(PASSWORD_MASK))
            .unwrap_or(false);
        if masked {
            if let Some(old_leaf) = lookup_path(&mut old_root, path) {
                let restored = old_leaf.take();
                if let Some(new_leaf) = lookup_path(&mut new_root, path) {
                    *new_leaf = restored;
                }
            }
        }
    }
    Ok(serde_json::to_string(&new_root)?)
}
