//! AEAD cipher factory: password-bound `CipherSpec` plus the per-session
//! encrypter/decrypter primitives it hands out.

use super::kdf::{evp_bytes_to_key, hkdf_sha1_subkey};
use crate::{Error, Result};
use aead::{generic_array::GenericArray, Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes192Gcm, Aes256Gcm};
use rand::RngCore;

/// Recognized cipher names and their wire-format sizes (key == salt size,
/// nonce always 12 bytes, tag always 16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
}

impl CipherKind {
    pub fn key_size(self) -> usize {
        match self {
            CipherKind::Aes128Gcm => 16,
            CipherKind::Aes192Gcm => 24,
            CipherKind::Aes256Gcm => 32,
        }
    }

    /// Salt size equals key size for all three table entries. Intentional
    /// and wire-observable, not a simplification.
    pub fn salt_size(self) -> usize {
        self.key_size()
    }

    pub fn nonce_size(self) -> usize {
        12
    }

    pub fn tag_size(self) -> usize {
        16
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherKind::Aes128Gcm => "aes-128-gcm",
            CipherKind::Aes192Gcm => "aes-192-gcm",
            CipherKind::Aes256Gcm => "aes-256-gcm",
        }
    }
}

impl std::str::FromStr for CipherKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "aes-128-gcm" => Ok(CipherKind::Aes128Gcm),
            "aes-192-gcm" => Ok(CipherKind::Aes192Gcm),
            "aes-256-gcm" => Ok(CipherKind::Aes256Gcm),
            other => Err(Error::unsupported_cipher(other)),
        }
    }
}

/// A bound AEAD primitive: seal/open over a fixed key, generic across the
/// three table entries.
pub enum AeadPrimitive {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl AeadPrimitive {
    fn new(kind: CipherKind, key: &[u8]) -> Result<Self> {
        Ok(match kind {
            CipherKind::Aes128Gcm => AeadPrimitive::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key)
                    .map_err(|e| Error::derivation(format!("bad subkey length: {e}")))?,
            )),
            CipherKind::Aes192Gcm => AeadPrimitive::Aes192(Box::new(
                Aes192Gcm::new_from_slice(key)
                    .map_err(|e| Error::derivation(format!("bad subkey length: {e}")))?,
            )),
            CipherKind::Aes256Gcm => AeadPrimitive::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key)
                    .map_err(|e| Error::derivation(format!("bad subkey length: {e}")))?,
            )),
        })
    }

    /// Seal `plaintext` under `nonce` (12 bytes), returning `ciphertext || tag`.
    pub fn seal(&self, nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = GenericArray::from_slice(nonce);
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        let sealed = match self {
            AeadPrimitive::Aes128(c) => c.encrypt(nonce, payload),
            AeadPrimitive::Aes192(c) => c.encrypt(nonce, payload),
            AeadPrimitive::Aes256(c) => c.encrypt(nonce, payload),
        };
        sealed.map_err(|e| Error::transport(format!("seal failed: {e}")))
    }

    /// Open `ciphertext || tag` under `nonce` (12 bytes). Any failure is an
    /// `Error::Auth`, fatal for the connection and never retried.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = GenericArray::from_slice(nonce);
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        let opened = match self {
            AeadPrimitive::Aes128(c) => c.decrypt(nonce, payload),
            AeadPrimitive::Aes192(c) => c.decrypt(nonce, payload),
            AeadPrimitive::Aes256(c) => c.decrypt(nonce, payload),
        };
        opened.map_err(|_| Error::Auth)
    }
}

/// Password-bound cipher configuration, shared read-only across every
/// Shadow Stream in the process.
#[derive(Clone)]
pub struct CipherSpec {
    kind: CipherKind,
    master_key: Vec<u8>,
}

impl CipherSpec {
    /// Bind a cipher name to a password, deriving the master key
    /// immediately (EVP_BytesToKey). Fails with `UnsupportedCipher` if
    /// `name` is not in the table.
    pub fn new(name: &str, password: &str) -> Result<Self> {
        let kind: CipherKind = name.parse()?;
        let master_key = evp_bytes_to_key(password, kind.key_size());
        Ok(CipherSpec { kind, master_key })
    }

    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    pub fn key_size(&self) -> usize {
        self.kind.key_size()
    }

    pub fn salt_size(&self) -> usize {
        self.kind.salt_size()
    }

    pub fn nonce_size(&self) -> usize {
        self.kind.nonce_size()
    }

    pub fn tag_size(&self) -> usize {
        self.kind.tag_size()
    }

    /// Derive the subkey for `salt` and bind an encrypting AEAD primitive.
    pub fn encrypter(&self, salt: &[u8]) -> Result<AeadPrimitive> {
        let subkey = hkdf_sha1_subkey(&self.master_key, salt, self.key_size())?;
        AeadPrimitive::new(self.kind, &subkey)
    }

    /// Derive the subkey for `salt` and bind a decrypting AEAD primitive.
    pub fn decrypter(&self, salt: &[u8]) -> Result<AeadPrimitive> {
        self.encrypter(salt)
    }

    /// Cryptographically random salt of `salt_size()` bytes.
    pub fn gen_salt(&self) -> Result<Vec<u8>> {
        let mut salt = vec![0u8; self.salt_size()];
        rand::thread_rng().try_fill_bytes(&mut salt).map_err(|e| {
            Error::randomness(format!("failed to generate salt: {e}"))
        })?;
        Ok(salt)
    }

    /// Zero-initialized nonce of `nonce_size()` bytes.
    pub fn gen_nonce(&self) -> Vec<u8> {
        vec![0u8; self.nonce_size()]
    }
}
