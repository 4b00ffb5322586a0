//! HKDF-SHA512 key derivation for pairing and session keys.

use hap_core::error::CryptoError;

use hkdf::Hkdf;
use sha2::Sha512;

/// Derive key using HKDF-SHA512.
///
/// # Arguments
/// * `ikm` - Input key material
/// * `salt` - Salt value (can be empty)
/// * `info` - Context/application-specific info
/// * `length` - Desired output length in bytes
pub fn derive_key(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Derive a 32-byte subkey from a salt/info label pair.
pub fn derive_key_32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let okm = derive_key(ikm, salt, info, 32)?;
    okm.try_into()
        .map_err(|_| CryptoError::KeyDerivation("HKDF output is not 32 bytes".to_string()))
}

/// Salt and info labels fixed by the pairing protocol.
pub mod constants {
    pub const PAIR_SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const PAIR_SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";

    pub const PAIR_SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const PAIR_SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";

    pub const PAIR_SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const PAIR_SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

    pub const PAIR_VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const PAIR_VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

    pub const CONTROL_SALT: &[u8] = b"Control-Salt";
    /// Protects controller to accessory traffic.
    pub const CONTROL_WRITE_KEY_INFO: &[u8] = b"Control-Write-Encryption-Key";
    /// Protects accessory to controller traffic.
    pub const CONTROL_READ_KEY_INFO: &[u8] = b"Control-Read-Encryption-Key";
}

/// Derive pair-setup M5/M6 encryption key from the SRP session key.
pub fn derive_pair_setup_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_ENCRYPT_SALT,
        constants::PAIR_SETUP_ENCRYPT_INFO,
    )
}

/// Derive the controller's signing prefix (`iOSDeviceX`) for pair-setup M5.
pub fn derive_controller_sign_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_CONTROLLER_SIGN_SALT,
        constants::PAIR_SETUP_CONTROLLER_SIGN_INFO,
    )
}

/// Derive the accessory's signing prefix (`AccessoryX`) for pair-setup M6.
pub fn derive_accessory_sign_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_ACCESSORY_SIGN_SALT,
        constants::PAIR_SETUP_ACCESSORY_SIGN_INFO,
    )
}

/// Derive pair-verify encryption key.
pub fn derive_pair_verify_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_VERIFY_ENCRYPT_SALT,
        constants::PAIR_VERIFY_ENCRYPT_INFO,
    )
}

/// Derive the controller to accessory transport key.
pub fn derive_control_write_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::CONTROL_SALT,
        constants::CONTROL_WRITE_KEY_INFO,
    )
}

/// Derive the accessory to controller transport key.
pub fn derive_control_read_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::CONTROL_SALT,
        constants::CONTROL_READ_KEY_INFO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    mod derive_key {
        use super::*;

        #[test]
        fn derives_requested_length() {
            let ikm = [0x0bu8; 22];
            let salt = [0x00u8; 13];

            assert_eq!(derive_key(&ikm, &salt, &[], 16).unwrap().len(), 16);
            assert_eq!(derive_key(&ikm, &salt, &[], 64).unwrap().len(), 64);
        }

        #[test]
        fn different_labels_produce_different_keys() {
            let ikm = [0x0bu8; 22];

            let a = derive_key_32(&ikm, b"salt1", b"info").unwrap();
            let b = derive_key_32(&ikm, b"salt2", b"info").unwrap();
            let c = derive_key_32(&ikm, b"salt1", b"info2").unwrap();
            assert_ne!(a, b);
            assert_ne!(a, c);
        }

        #[test]
        fn deterministic_output() {
            let ikm = [0x0bu8; 22];
            let key1 = derive_key_32(&ikm, b"constant_salt", b"constant_info").unwrap();
            let key2 = derive_key_32(&ikm, b"constant_salt", b"constant_info").unwrap();
            assert_eq!(key1, key2);
        }

        #[test]
        fn key_32_matches_prefix_of_longer_output() {
            let ikm = [0x42u8; 64];
            let long = derive_key(&ikm, b"s", b"i", 64).unwrap();
            let short = derive_key_32(&ikm, b"s", b"i").unwrap();
            assert_eq!(&long[..32], &short[..]);
        }

        #[test]
        fn rejects_oversized_output() {
            // HKDF-SHA512 caps output at 255 * 64 bytes.
            let result = derive_key(&[1u8; 32], b"s", b"i", 255 * 64 + 1);
            assert!(matches!(result, Err(CryptoError::KeyDerivation(_))));
        }
    }

    mod pairing_labels {
        use super::*;

        #[test]
        fn every_purpose_yields_a_distinct_key() {
            let secret = [0xABu8; 64];
            let keys = [
                derive_pair_setup_key(&secret).unwrap(),
                derive_controller_sign_key(&secret).unwrap(),
                derive_accessory_sign_key(&secret).unwrap(),
                derive_pair_verify_key(&secret).unwrap(),
                derive_control_write_key(&secret).unwrap(),
                derive_control_read_key(&secret).unwrap(),
            ];
            for i in 0..keys.len() {
                for j in (i + 1)..keys.len() {
                    assert_ne!(keys[i], keys[j], "keys {} and {} collide", i, j);
                }
            }
        }

        #[test]
        fn helpers_use_published_labels() {
            let secret = [0x11u8; 32];
            assert_eq!(
                derive_pair_verify_key(&secret).unwrap(),
                derive_key_32(&secret, b"Pair-Verify-Encrypt-Salt", b"Pair-Verify-Encrypt-Info")
                    .unwrap()
            );
            assert_eq!(
                derive_control_read_key(&secret).unwrap(),
                derive_key_32(&secret, b"Control-Salt", b"Control-Read-Encryption-Key").unwrap()
            );
        }
    }

    mod known_vectors {
        use super::*;

        #[test]
        fn rfc5869_case_1_inputs_with_sha512() {
            // RFC 5869 test case 1 inputs; SHA-512 output from the HKDF reference.
            let ikm = hex::decode("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b").unwrap();
            let salt = hex::decode("000102030405060708090a0b0c").unwrap();
            let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

            let okm = derive_key(&ikm, &salt, &info, 42).unwrap();
            assert_eq!(
                hex::encode(okm),
                "832390086cda71fb47625bb5ceb168e4c8e26a1a16ed34d9fc7fe92c1481579338da362cb8d9f925d7cb"
            );
        }
    }
}
