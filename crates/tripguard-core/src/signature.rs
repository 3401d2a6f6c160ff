//! Password-protected fileset signatures.
//!
//! A signature is the SHA-256 digest of a fileset's raw key/value pairs in
//! key order, encrypted with XChaCha20-Poly1305 under an Argon2id key derived
//! from the operator's password. The fileset name is bound as associated
//! data, so a signature moved onto another fileset does not authenticate.
//!
//! Envelope layout (little endian):
//!
//! ```text
//! magic[8] | m_cost u32 | t_cost u32 | p_cost u32 | salt[32] | nonce[24] | ciphertext
//! ```

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::crypto::{self, KdfParams, NONCE_LEN, SALT_LEN};
use crate::error::{Error, Result, SignatureError};
use crate::fileset::FilesetName;
use crate::store::Store;

pub const SIGNATURE_MAGIC: &[u8; 8] = b"TGSIG01\0";

const PARAMS_AT: usize = 8;
const SALT_AT: usize = PARAMS_AT + 12;
const NONCE_AT: usize = SALT_AT + SALT_LEN;
const HEADER_LEN: usize = NONCE_AT + NONCE_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Envelope {
    params: KdfParams,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        buf.extend_from_slice(SIGNATURE_MAGIC);
        buf.extend_from_slice(&self.params.memory_cost.to_le_bytes());
        buf.extend_from_slice(&self.params.time_cost.to_le_bytes());
        buf.extend_from_slice(&self.params.parallelism.to_le_bytes());
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    /// `None` for anything that is not a well-formed envelope.
    fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() <= HEADER_LEN || &buf[..PARAMS_AT] != SIGNATURE_MAGIC {
            return None;
        }
        let params = KdfParams {
            memory_cost: u32_at(buf, PARAMS_AT)?,
            time_cost: u32_at(buf, PARAMS_AT + 4)?,
            parallelism: u32_at(buf, PARAMS_AT + 8)?,
        };
        if !params.within_bounds() {
            return None;
        }
        Some(Self {
            params,
            salt: buf.get(SALT_AT..NONCE_AT)?.try_into().ok()?,
            nonce: buf.get(NONCE_AT..HEADER_LEN)?.try_into().ok()?,
            ciphertext: buf[HEADER_LEN..].to_vec(),
        })
    }
}

fn u32_at(buf: &[u8], at: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

#[derive(Debug, Clone, Default)]
pub struct SignatureEngine {
    params: KdfParams,
}

impl SignatureEngine {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// SHA-256 over every key followed by its value, in key order.
    ///
    /// Keys and values are fed without length framing, so the digest covers
    /// the concatenated byte stream and not the key/value boundaries.
    pub fn fileset_digest(store: &Store, fileset: &FilesetName) -> Result<[u8; 32]> {
        let mut hasher = Sha256::new();
        store.for_each_raw(fileset, |key, value| {
            hasher.update(key);
            hasher.update(value);
        })?;
        Ok(hasher.finalize().into())
    }

    /// Sign the current contents of `fileset`. An existing signature is only
    /// replaced when `overwrite` is set.
    pub fn sign(
        &self,
        store: &Store,
        fileset: &FilesetName,
        password: &str,
        overwrite: bool,
    ) -> Result<()> {
        self.params.check_bounds()?;
        if !overwrite && store.signature(fileset)?.is_some() {
            return Err(SignatureError::Exists(fileset.to_string()).into());
        }
        let digest = Self::fileset_digest(store, fileset)?;
        debug!(fileset = %fileset, digest = %hex::encode(digest), "fileset digest");

        let salt = crypto::generate_salt();
        let nonce = crypto::generate_nonce();
        let key = crypto::derive_key(password, &salt, &self.params)?;
        let ciphertext = crypto::encrypt(&key, &nonce, &digest, fileset.as_str().as_bytes())?;
        debug!(ciphertext = %hex::encode(&ciphertext), "signature encrypted");

        let envelope = Envelope {
            params: self.params,
            salt,
            nonce,
            ciphertext,
        };
        store.put_signature(fileset, &envelope.to_bytes())?;
        info!(fileset = %fileset, "fileset signed");
        Ok(())
    }

    /// Check `fileset` against its stored signature.
    ///
    /// A missing signature cannot be told apart from one an attacker removed;
    /// both report [`SignatureError::Missing`].
    pub fn verify(&self, store: &Store, fileset: &FilesetName, password: &str) -> Result<()> {
        let digest = Self::fileset_digest(store, fileset)?;
        debug!(fileset = %fileset, digest = %hex::encode(digest), "fileset digest");

        let raw = store
            .signature(fileset)?
            .ok_or_else(|| SignatureError::Missing(fileset.to_string()))?;
        let envelope = Envelope::from_bytes(&raw).ok_or(SignatureError::WrongPassword)?;

        let key = crypto::derive_key(password, &envelope.salt, &envelope.params)
            .map_err(|_| SignatureError::WrongPassword)?;
        let recorded = crypto::decrypt(
            &key,
            &envelope.nonce,
            &envelope.ciphertext,
            fileset.as_str().as_bytes(),
        )?;
        if recorded.as_slice() != digest.as_slice() {
            return Err(Error::Signature(SignatureError::ContentsChanged));
        }
        info!(fileset = %fileset, "signature verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BaselineRecord;

    fn fast() -> SignatureEngine {
        SignatureEngine::new(KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        })
    }

    fn store_with(fileset: &FilesetName, paths: &[&str]) -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store.begin(true).unwrap();
        for path in paths {
            store
                .add(path, &BaselineRecord::new(false), fileset, false)
                .unwrap();
        }
        store
    }

    #[test]
    fn envelope_rejects_garbage_and_oversized_params() {
        let envelope = Envelope {
            params: KdfParams::default(),
            salt: [1; SALT_LEN],
            nonce: [2; NONCE_LEN],
            ciphertext: vec![3; 48],
        };
        let bytes = envelope.to_bytes();
        assert_eq!(Envelope::from_bytes(&bytes), Some(envelope.clone()));
        assert_eq!(Envelope::from_bytes(&bytes[..HEADER_LEN]), None);
        assert_eq!(Envelope::from_bytes(b"junk"), None);

        let mut huge = bytes.clone();
        huge[PARAMS_AT..PARAMS_AT + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(Envelope::from_bytes(&huge), None);
    }

    #[test]
    fn digest_depends_on_keys_values_and_order() {
        let set = FilesetName::default();
        let a = store_with(&set, &["/a", "/b"]);
        let b = store_with(&set, &["/a", "/c"]);
        let da = SignatureEngine::fileset_digest(&a, &set).unwrap();
        let db = SignatureEngine::fileset_digest(&b, &set).unwrap();
        assert_ne!(da, db);

        // Insertion order is irrelevant, only key order counts.
        let again = store_with(&set, &["/b", "/a"]);
        assert_eq!(da, SignatureEngine::fileset_digest(&again, &set).unwrap());
    }

    #[test]
    fn sign_refuses_to_overwrite_unless_asked() {
        let set = FilesetName::default();
        let store = store_with(&set, &["/a"]);
        let engine = fast();
        engine.sign(&store, &set, "pw", false).unwrap();
        assert!(matches!(
            engine.sign(&store, &set, "pw", false),
            Err(Error::Signature(SignatureError::Exists(_)))
        ));
        engine.sign(&store, &set, "pw2", true).unwrap();
        engine.verify(&store, &set, "pw2").unwrap();
    }

    #[test]
    fn sign_rejects_costs_verify_would_refuse() {
        let set = FilesetName::default();
        let store = store_with(&set, &["/a"]);
        let engine = SignatureEngine::new(KdfParams {
            memory_cost: crypto::MAX_MEMORY_COST + 8,
            time_cost: 1,
            parallelism: 1,
        });
        assert!(matches!(
            engine.sign(&store, &set, "pw", false),
            Err(Error::Signature(SignatureError::KeyDerivation(_)))
        ));
        assert_eq!(store.signature(&set).unwrap(), None);
    }

    #[test]
    fn signature_does_not_transfer_between_filesets() {
        let a = FilesetName::new("a").unwrap();
        let b = FilesetName::new("b").unwrap();
        let store = store_with(&a, &["/x"]);
        store
            .add("/x", &BaselineRecord::new(false), &b, false)
            .unwrap();
        let engine = fast();
        engine.sign(&store, &a, "pw", false).unwrap();

        let stolen = store.signature(&a).unwrap().unwrap();
        store.put_signature(&b, &stolen).unwrap();
        assert!(matches!(
            engine.verify(&store, &b, "pw"),
            Err(Error::Signature(SignatureError::WrongPassword))
        ));
    }

    #[test]
    fn unknown_fileset_fails_before_signature_lookup() {
        let store = store_with(&FilesetName::default(), &[]);
        let missing = FilesetName::new("nope").unwrap();
        assert!(matches!(
            fast().verify(&store, &missing, "pw"),
            Err(Error::UnknownFileset(_))
        ));
    }
}
