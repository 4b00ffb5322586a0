//! Ed25519 signatures for long-term accessory and controller identities.

use hap_core::error::CryptoError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// Ed25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

/// Long-term Ed25519 identity key pair.
///
/// Clone is allowed so the accessory identity can be shared with the
/// pairing server; every copy zeroizes on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32], // Ed25519 seed (32 bytes, not expanded)
}

impl IdentityKeyPair {
    /// Generate a new random identity key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = signing_key.verifying_key().to_bytes();
        let secret = signing_key.to_bytes();
        Self { public, secret }
    }

    /// Create from seed bytes (32 bytes).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let public = signing_key.verifying_key().to_bytes();
        Self {
            public,
            secret: *seed,
        }
    }

    /// Load from expanded secret key (64 bytes: seed || public key).
    ///
    /// Fails when the stored public half does not match the seed.
    pub fn from_secret(secret: &[u8; 64]) -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&secret[..32]);

        let pair = Self::from_seed(&seed);
        if pair.public[..] != secret[32..] {
            return Err(CryptoError::KeyDerivation(
                "Public key does not match seed".to_string(),
            ));
        }
        Ok(pair)
    }

    /// Get the public key (32 bytes).
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Sign a message, returning 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(&self.secret);
        signing_key.sign(message).to_bytes()
    }

    /// Export the seed for storage (32 bytes).
    pub fn seed(&self) -> [u8; 32] {
        self.secret
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Verify an Ed25519 signature.
pub fn verify(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(format!("Ed25519: {}", e)))?;

    let sig = Signature::from_bytes(signature);

    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::BadSignature)
}

/// Verify a signature given as raw wire slices.
///
/// Wrong-length keys or signatures are rejected before any curve work.
pub fn verify_slice(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let public_key: &[u8; PUBLIC_KEY_LEN] =
        public_key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: PUBLIC_KEY_LEN,
            actual: public_key.len(),
        })?;
    let signature: &[u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| CryptoError::BadSignature)?;
    verify(public_key, message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod key_generation {
        use super::*;

        #[test]
        fn generate_creates_unique_keys() {
            let kp1 = IdentityKeyPair::generate();
            let kp2 = IdentityKeyPair::generate();
            assert_ne!(kp1.public_key(), kp2.public_key());
        }

        #[test]
        fn seed_roundtrip() {
            let kp = IdentityKeyPair::generate();
            let restored = IdentityKeyPair::from_seed(&kp.seed());
            assert_eq!(kp.public_key(), restored.public_key());
        }

        #[test]
        fn from_secret_validates_public_key() {
            let kp = IdentityKeyPair::generate();
            let mut expanded = [0u8; 64];
            expanded[..32].copy_from_slice(&kp.seed());
            expanded[32..].copy_from_slice(&kp.public_key());
            assert_eq!(IdentityKeyPair::from_secret(&expanded).unwrap().public_key(), kp.public_key());

            expanded[40] ^= 0xFF;
            assert!(IdentityKeyPair::from_secret(&expanded).is_err());
        }

        #[test]
        fn debug_hides_secret() {
            let kp = IdentityKeyPair::from_seed(&[0x77u8; 32]);
            let rendered = format!("{:?}", kp);
            assert!(rendered.contains("REDACTED"));
            assert!(!rendered.contains(&format!("{:?}", [0x77u8; 32])));
        }
    }

    mod verification {
        use super::*;

        #[test]
        fn accepts_valid_signature() {
            let kp = IdentityKeyPair::generate();
            let sig = kp.sign(b"accessory info");
            assert!(verify(&kp.public_key(), b"accessory info", &sig).is_ok());
        }

        #[test]
        fn rejects_wrong_message() {
            let kp = IdentityKeyPair::generate();
            let sig = kp.sign(b"message");
            assert!(matches!(
                verify(&kp.public_key(), b"massage", &sig),
                Err(CryptoError::BadSignature)
            ));
        }

        #[test]
        fn rejects_wrong_public_key() {
            let kp = IdentityKeyPair::generate();
            let other = IdentityKeyPair::generate();
            let sig = kp.sign(b"message");
            assert!(verify(&other.public_key(), b"message", &sig).is_err());
        }

        #[test]
        fn verify_slice_checks_lengths() {
            let kp = IdentityKeyPair::generate();
            let sig = kp.sign(b"m");
            assert!(verify_slice(&kp.public_key(), b"m", &sig).is_ok());
            assert!(matches!(
                verify_slice(&kp.public_key()[..31], b"m", &sig),
                Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
            ));
            assert!(matches!(
                verify_slice(&kp.public_key(), b"m", &sig[..63]),
                Err(CryptoError::BadSignature)
            ));
        }
    }

    mod known_vectors {
        use super::*;

        fn arr32(hex_str: &str) -> [u8; 32] {
            hex::decode(hex_str).unwrap().try_into().unwrap()
        }

        #[test]
        fn rfc8032_test_vector_1() {
            // RFC 8032 Section 7.1 - Test 1, empty message
            let kp = IdentityKeyPair::from_seed(&arr32(
                "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60",
            ));
            assert_eq!(
                hex::encode(kp.public_key()),
                "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"
            );

            let signature = kp.sign(b"");
            assert_eq!(
                hex::encode(signature),
                "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b"
            );
            assert!(verify(&kp.public_key(), b"", &signature).is_ok());
        }

        #[test]
        fn rfc8032_test_vector_2() {
            // RFC 8032 Section 7.1 - Test 2, message 0x72
            let kp = IdentityKeyPair::from_seed(&arr32(
                "4ccd089b28ff96da9db6c346ec114e0f5b8a319f35aba624da8cf6ed4fb8a6fb",
            ));
            assert_eq!(
                hex::encode(kp.public_key()),
                "3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c"
            );
            assert_eq!(
                hex::encode(kp.sign(&[0x72])),
                "92a009a9f0d4cab8720e820b5f642540a2b27b5416503f8fb3762223ebdb69da085ac1e43e15996e458f3613d0f11d8c387b2eaeb4302aeeb00d291612bb0c00"
            );
        }
    }
}
