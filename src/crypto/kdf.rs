//! Password and salt based key derivation.
//!
//! Two deterministic, side-effect-free functions: OpenSSL-compatible
//! `EVP_BytesToKey` (password -> master key) and HKDF-SHA1 (master key,
//! salt -> per-session subkey), matching the Shadowsocks AEAD spec.

use crate::Result;
use hkdf::Hkdf;
use md5::{Digest, Md5};
use sha1::Sha1;

const MD5_LEN: usize = 16;
const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// Derive a master key from a password using OpenSSL's `EVP_BytesToKey`
/// with count=1 and no salt: repeatedly MD5 the previous digest
/// concatenated with the password until at least `key_size` bytes have
/// been produced, then truncate.
pub fn evp_bytes_to_key(password: &str, key_size: usize) -> Vec<u8> {
    let password = password.as_bytes();
    let mut key = Vec::with_capacity(key_size + MD5_LEN);
    let mut prev: Vec<u8> = Vec::new();

    while key.len() < key_size {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }

    key.truncate(key_size);
    key
}

/// Derive a per-session subkey from the master key and a random salt via
/// HKDF-SHA1, info = `"ss-subkey"`, output length = `key_size`.
pub fn hkdf_sha1_subkey(master_key: &[u8], salt: &[u8], key_size: usize) -> Result<Vec<u8>> {
    let hk = Hkdf::<Sha1>::new(Some(salt), master_key);
    let mut subkey = vec![0u8; key_size];
    hk.expand(SUBKEY_INFO, &mut subkey)
        .map_err(|e| crate::Error::derivation(format!("HKDF expand failed: {e}")))?;
    Ok(subkey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evp_bytes_to_key_contract_vector() {
        let key = evp_bytes_to_key("123456", 16);
        assert_eq!(
            key,
            vec![
                0xE1, 0x0A, 0xDC, 0x39, 0x49, 0xBA, 0x59, 0xAB, 0xBE, 0x56, 0xE0, 0x57, 0xF2,
                0x0F, 0x88, 0x3E,
            ]
        );
    }

    #[test]
    fn evp_bytes_to_key_length_and_prefix() {
        for size in [16usize, 24, 32] {
            let key = evp_bytes_to_key("a somewhat long passphrase", size);
            assert_eq!(key.len(), size);

            let mut hasher = Md5::new();
            hasher.update(b"a somewhat long passphrase");
            let first16 = hasher.finalize();
            assert_eq!(&key[..16.min(size)], &first16[..16.min(size)]);
        }
    }

    #[test]
    fn hkdf_subkey_has_requested_length() {
        let master = evp_bytes_to_key("pw", 32);
        let salt = [7u8; 32];
        let subkey = hkdf_sha1_subkey(&master, &salt, 32).unwrap();
        assert_eq!(subkey.len(), 32);
    }

    #[test]
    fn hkdf_subkey_differs_per_salt() {
        let master = evp_bytes_to_key("pw", 16);
        let a = hkdf_sha1_subkey(&master, &[1u8; 16], 16).unwrap();
        let b = hkdf_sha1_subkey(&master, &[2u8; 16], 16).unwrap();
        assert_ne!(a, b);
    }
}
