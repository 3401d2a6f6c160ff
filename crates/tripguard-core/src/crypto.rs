use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, OsRng, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::SignatureError;

pub const KDF_TIME_COST: u32 = 3;
pub const KDF_MEMORY_COST: u32 = 65536; // 64MB
pub const KDF_PARALLELISM: u32 = 4;
pub const DERIVED_KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

// Upper bounds on accepted cost parameters, for signing and for envelopes read
// back from the store.
pub const MAX_MEMORY_COST: u32 = 1 << 20;
pub const MAX_TIME_COST: u32 = 64;
pub const MAX_PARALLELISM: u32 = 64;

/// Argon2id cost parameters. They travel with every signature so that a
/// signature stays verifiable after the defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: KDF_MEMORY_COST,
            time_cost: KDF_TIME_COST,
            parallelism: KDF_PARALLELISM,
        }
    }
}

impl KdfParams {
    pub fn within_bounds(&self) -> bool {
        self.memory_cost <= MAX_MEMORY_COST
            && self.time_cost <= MAX_TIME_COST
            && self.parallelism <= MAX_PARALLELISM
    }

    pub fn check_bounds(&self) -> Result<(), SignatureError> {
        if self.within_bounds() {
            Ok(())
        } else {
            Err(SignatureError::KeyDerivation(format!(
                "argon2 params out of range (memory <= {MAX_MEMORY_COST} KiB, \
                 time <= {MAX_TIME_COST}, parallelism <= {MAX_PARALLELISM})"
            )))
        }
    }
}

pub fn derive_key(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<Vec<u8>>, SignatureError> {
    let params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(DERIVED_KEY_LEN),
    )
    .map_err(|e| SignatureError::KeyDerivation(format!("argon2 params: {e}")))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new(vec![0u8; DERIVED_KEY_LEN]);
    argon
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| SignatureError::KeyDerivation(format!("argon2 derive: {e}")))?;
    Ok(key)
}

pub fn encrypt(
    key: &[u8],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, SignatureError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = XNonce::from_slice(nonce);
    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| SignatureError::Encrypt)
}

/// Any authentication failure, whatever its cause, surfaces as
/// [`SignatureError::WrongPassword`].
pub fn decrypt(
    key: &[u8],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, SignatureError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = XNonce::from_slice(nonce);
    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| SignatureError::WrongPassword)?;
    Ok(Zeroizing::new(plaintext))
}

pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
