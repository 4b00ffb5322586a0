//! Session key types and derivation.

use crate::hkdf;
use hap_core::error::CryptoError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret from SRP or ECDH.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(pub Vec<u8>);

/// 32-byte encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(pub [u8; 32]);

/// Directional transport keys for one side of an encrypted connection.
///
/// `write_key` protects what this side sends and `read_key` what it
/// receives, so an accessory's `write_key` equals its controller's `read_key`.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for encrypting data we send.
    pub write_key: EncryptionKey,
    /// Key for decrypting data we receive.
    pub read_key: EncryptionKey,
}

impl SharedSecret {
    /// Create from raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl EncryptionKey {
    /// Create from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl SessionKeys {
    /// Transport keys as seen by the controller.
    pub fn derive_controller_keys(shared_secret: &SharedSecret) -> Result<Self, CryptoError> {
        Ok(Self {
            write_key: EncryptionKey(hkdf::derive_control_write_key(shared_secret.as_bytes())?),
            read_key: EncryptionKey(hkdf::derive_control_read_key(shared_secret.as_bytes())?),
        })
    }

    /// Transport keys as seen by the accessory.
    pub fn derive_accessory_keys(shared_secret: &SharedSecret) -> Result<Self, CryptoError> {
        Ok(Self {
            write_key: EncryptionKey(hkdf::derive_control_read_key(shared_secret.as_bytes())?),
            read_key: EncryptionKey(hkdf::derive_control_write_key(shared_secret.as_bytes())?),
        })
    }

    /// Derive the key sealing pair-setup M5/M6.
    pub fn derive_pair_setup_key(shared_secret: &SharedSecret) -> Result<EncryptionKey, CryptoError> {
        let key = hkdf::derive_pair_setup_key(shared_secret.as_bytes())?;
        Ok(EncryptionKey(key))
    }

    /// Derive the key sealing pair-verify M2/M3.
    pub fn derive_pair_verify_key(shared_secret: &SharedSecret) -> Result<EncryptionKey, CryptoError> {
        let key = hkdf::derive_pair_verify_key(shared_secret.as_bytes())?;
        Ok(EncryptionKey(key))
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED; {}])", self.0.len())
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("write_key", &self.write_key)
            .field("read_key", &self.read_key)
            .finish()
    }
}
