//! Key derivation and AEAD cipher factory.

mod cipher;
mod kdf;
mod nonce;

pub use cipher::{AeadPrimitive, CipherKind, CipherSpec};
pub use kdf::{evp_bytes_to_key, hkdf_sha1_subkey};
pub use nonce::increment as increment_nonce;
