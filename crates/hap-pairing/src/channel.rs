//! Encrypted transport for a verified connection.
//!
//! Once pair-verify M4 has been sent, every byte on the connection travels in
//! ChaCha20-Poly1305 frames keyed by the pair-verify transport keys.

use hap_core::error::{Error, Result};
use hap_crypto::chacha::{FrameCipher, TAG_LEN};
use hap_crypto::keys::SessionKeys;

/// Frame-level encryption for one side of a verified connection.
///
/// ```text
/// +---------------+------------------+----------+
/// | Length (2 LE) | Ciphertext (len) | Tag (16) |
/// +---------------+------------------+----------+
/// ```
///
/// The length prefix is also the AAD. Plaintext longer than 1024 bytes is
/// split across several frames. Nonces are per-direction counters.
pub struct EncryptedChannel {
    cipher: FrameCipher,
}

impl EncryptedChannel {
    /// Channel keyed by one side's transport keys.
    ///
    /// Accessory and controller each build their own channel from their own
    /// [`SessionKeys`]; the accessory's write key is the controller's read key.
    pub fn new(keys: &SessionKeys) -> Self {
        Self::with_keys(*keys.write_key.as_bytes(), *keys.read_key.as_bytes())
    }

    pub fn with_keys(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        Self {
            cipher: FrameCipher::new(write_key, read_key),
        }
    }

    /// Encrypt outbound data into one or more frames.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher.encrypt(plaintext).map_err(Error::Crypto)
    }

    /// Decrypt a buffer holding one or more complete frames.
    ///
    /// Use [`parse_frame_length`](Self::parse_frame_length) to know when a
    /// frame has fully arrived.
    pub fn decrypt(&mut self, frames: &[u8]) -> Result<Vec<u8>> {
        self.cipher.decrypt(frames).map_err(Error::Crypto)
    }

    /// Total size of the frame at the start of `data`, including prefix and tag.
    ///
    /// Returns `None` if the buffer is too short to contain the length prefix.
    pub fn parse_frame_length(data: &[u8]) -> Option<usize> {
        if data.len() < 2 {
            return None;
        }
        let len = u16::from_le_bytes([data[0], data[1]]) as usize;
        Some(2 + len + TAG_LEN)
    }

    pub fn write_nonce(&self) -> u64 {
        self.cipher.encrypt_counter()
    }

    pub fn read_nonce(&self) -> u64 {
        self.cipher.decrypt_counter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hap_core::error::CryptoError;
    use hap_crypto::keys::EncryptionKey;

    const ACCESSORY_WRITE: [u8; 32] = [0x11; 32];
    const ACCESSORY_READ: [u8; 32] = [0x22; 32];

    fn pair() -> (EncryptedChannel, EncryptedChannel) {
        let accessory = EncryptedChannel::with_keys(ACCESSORY_WRITE, ACCESSORY_READ);
        let controller = EncryptedChannel::with_keys(ACCESSORY_READ, ACCESSORY_WRITE);
        (accessory, controller)
    }

    mod framing {
        use super::*;

        #[test]
        fn frame_layout() {
            let (mut accessory, _) = pair();
            let framed = accessory.encrypt(b"test").unwrap();

            // 2-byte length + 4 bytes ciphertext + 16-byte tag
            assert_eq!(framed.len(), 22);
            assert_eq!(&framed[..2], &[0x04, 0x00]);
            assert_eq!(EncryptedChannel::parse_frame_length(&framed), Some(22));
        }

        #[test]
        fn parse_frame_length_needs_prefix() {
            assert_eq!(EncryptedChannel::parse_frame_length(&[0x00]), None);
            assert_eq!(EncryptedChannel::parse_frame_length(&[0x00, 0x04]), Some(2 + 0x400 + 16));
        }

        #[test]
        fn large_payload_spans_frames() {
            let (mut accessory, mut controller) = pair();
            let payload = vec![0x5A; 2500];

            let framed = accessory.encrypt(&payload).unwrap();
            assert_eq!(framed.len(), 2500 + 3 * (2 + 16));
            assert_eq!(accessory.write_nonce(), 3);

            assert_eq!(controller.decrypt(&framed).unwrap(), payload);
            assert_eq!(controller.read_nonce(), 3);
        }
    }

    mod roundtrip {
        use super::*;

        #[test]
        fn both_directions() {
            let (mut accessory, mut controller) = pair();

            let request = controller.encrypt(b"GET /accessories HTTP/1.1\r\n\r\n").unwrap();
            assert_eq!(
                accessory.decrypt(&request).unwrap(),
                b"GET /accessories HTTP/1.1\r\n\r\n"
            );

            let response = accessory.encrypt(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
            assert_eq!(controller.decrypt(&response).unwrap(), b"HTTP/1.1 200 OK\r\n\r\n");
        }

        #[test]
        fn nonces_advance_per_message() {
            let (mut accessory, mut controller) = pair();

            for i in 0..5 {
                let message = format!("event {}", i);
                let framed = accessory.encrypt(message.as_bytes()).unwrap();
                assert_eq!(controller.decrypt(&framed).unwrap(), message.as_bytes());
            }

            assert_eq!(accessory.write_nonce(), 5);
            assert_eq!(accessory.read_nonce(), 0);
            assert_eq!(controller.read_nonce(), 5);
        }

        #[test]
        fn new_uses_session_keys() {
            let accessory_keys = SessionKeys {
                write_key: EncryptionKey::new(ACCESSORY_WRITE),
                read_key: EncryptionKey::new(ACCESSORY_READ),
            };
            let mut accessory = EncryptedChannel::new(&accessory_keys);
            let (_, mut controller) = pair();

            let framed = accessory.encrypt(b"ping").unwrap();
            assert_eq!(controller.decrypt(&framed).unwrap(), b"ping");
        }
    }

    mod rejection {
        use super::*;

        #[test]
        fn tampered_frame() {
            let (mut accessory, mut controller) = pair();
            let mut framed = accessory.encrypt(b"sensitive").unwrap();
            framed[4] ^= 0x80;

            assert!(matches!(
                controller.decrypt(&framed),
                Err(Error::Crypto(CryptoError::AuthTagMismatch))
            ));
        }

        #[test]
        fn truncated_frame() {
            let (_, mut controller) = pair();
            let truncated = [0x14, 0x00, 0x01, 0x02, 0x03];
            assert!(controller.decrypt(&truncated).is_err());
        }

        #[test]
        fn replayed_frame() {
            let (mut accessory, mut controller) = pair();
            let framed = accessory.encrypt(b"once").unwrap();

            controller.decrypt(&framed).unwrap();
            assert!(controller.decrypt(&framed).is_err());
        }
    }
}
