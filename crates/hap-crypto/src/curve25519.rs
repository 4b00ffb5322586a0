//! Curve25519 ECDH for pair-verify session agreement.

use hap_core::error::CryptoError;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

/// Ephemeral Curve25519 key pair, one per pair-verify attempt.
#[derive(ZeroizeOnDrop)]
pub struct EcdhKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
}

impl EcdhKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public: public.to_bytes(),
            secret: secret.to_bytes(),
        }
    }

    /// Create from existing secret key bytes.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let static_secret = StaticSecret::from(*secret);
        let public = PublicKey::from(&static_secret);
        Self {
            public: public.to_bytes(),
            secret: *secret,
        }
    }

    /// Get the public key (32 bytes).
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Perform Diffie-Hellman key exchange, consuming the key pair.
    ///
    /// Rejects an all-zero peer key and any peer key that yields an
    /// all-zero shared secret (low-order points).
    pub fn diffie_hellman(self, peer_public: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
        if peer_public.iter().all(|&b| b == 0) {
            return Err(CryptoError::InvalidPublicKey(
                "X25519 peer key is all zeros".to_string(),
            ));
        }

        let static_secret = StaticSecret::from(self.secret);
        let shared = static_secret.diffie_hellman(&PublicKey::from(*peer_public));

        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey(
                "X25519 peer key is a low-order point".to_string(),
            ));
        }

        Ok(shared.to_bytes())
    }
}

/// Parse a peer public key from a wire slice.
pub fn peer_key(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: 32,
        actual: bytes.len(),
    })
}
