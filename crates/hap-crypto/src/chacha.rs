//! ChaCha20-Poly1305 AEAD for handshake payloads and the encrypted transport.

use hap_core::error::CryptoError;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use zeroize::ZeroizeOnDrop;

/// Length of the Poly1305 authentication tag.
pub const TAG_LEN: usize = 16;

/// Largest plaintext carried by a single transport frame.
pub const MAX_FRAME_LEN: usize = 0x400;

/// Encrypt a handshake payload under a textual nonce label.
///
/// Returns ciphertext with the 16-byte tag appended.
pub fn encrypt(key: &[u8; 32], label: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = nonce_from_string(label);

    cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))
}

/// Decrypt `ciphertext || tag` as produced by [`encrypt`].
///
/// A tag that does not verify yields [`CryptoError::AuthTagMismatch`].
pub fn decrypt_sealed(key: &[u8; 32], label: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < TAG_LEN {
        return Err(CryptoError::Decryption(
            "Ciphertext too short (missing tag)".to_string(),
        ));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = nonce_from_string(label);

    cipher
        .decrypt(Nonce::from_slice(&nonce), sealed)
        .map_err(|_| CryptoError::AuthTagMismatch)
}

/// Create a 12-byte nonce from a label (right-aligned, left-padded with zeros).
///
/// Handshake labels like "PV-Msg02" become `\x00\x00\x00\x00PV-Msg02`.
pub fn nonce_from_string(s: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    let len = s.len().min(12);
    let start = 12 - len;
    nonce[start..].copy_from_slice(&s[..len]);
    nonce
}

/// Build 12-byte nonce from counter.
fn build_nonce_from_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..12].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Transport cipher for a verified connection, with per-direction counters.
///
/// Each frame is `[u16_le len][ciphertext][16-byte tag]` with AAD = len.
#[derive(ZeroizeOnDrop)]
pub struct FrameCipher {
    write_key: [u8; 32],
    read_key: [u8; 32],
    #[zeroize(skip)]
    write_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    read_cipher: ChaCha20Poly1305,
    #[zeroize(skip)]
    encrypt_counter: u64,
    #[zeroize(skip)]
    decrypt_counter: u64,
}

impl FrameCipher {
    /// Create cipher with separate write/read keys.
    pub fn new(write_key: [u8; 32], read_key: [u8; 32]) -> Self {
        let write_cipher = ChaCha20Poly1305::new(&write_key.into());
        let read_cipher = ChaCha20Poly1305::new(&read_key.into());
        Self {
            write_key,
            read_key,
            write_cipher,
            read_cipher,
            encrypt_counter: 0,
            decrypt_counter: 0,
        }
    }

    /// Encrypt outbound bytes, splitting into frames of at most 1024 bytes.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.is_empty() {
            return Err(CryptoError::Encryption("Empty plaintext".to_string()));
        }

        let frames = plaintext.len().div_ceil(MAX_FRAME_LEN);
        let mut out = Vec::with_capacity(plaintext.len() + frames * (2 + TAG_LEN));

        for block in plaintext.chunks(MAX_FRAME_LEN) {
            let aad = (block.len() as u16).to_le_bytes();
            let nonce = build_nonce_from_counter(self.encrypt_counter);

            let sealed = self
                .write_cipher
                .encrypt(Nonce::from_slice(&nonce), Payload { msg: block, aad: &aad })
                .map_err(|e| CryptoError::Encryption(format!("Encryption failed: {}", e)))?;

            out.extend_from_slice(&aad);
            out.extend_from_slice(&sealed);
            self.encrypt_counter += 1;
        }

        Ok(out)
    }

    /// Decrypt one frame body (`ciphertext || tag`) of the given length.
    pub fn decrypt_frame(&mut self, sealed: &[u8], frame_len: u16) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() != frame_len as usize + TAG_LEN {
            return Err(CryptoError::Decryption("Frame length mismatch".to_string()));
        }

        let aad = frame_len.to_le_bytes();
        let nonce = build_nonce_from_counter(self.decrypt_counter);

        let plaintext = self
            .read_cipher
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: sealed, aad: &aad })
            .map_err(|_| CryptoError::AuthTagMismatch)?;

        self.decrypt_counter += 1;
        Ok(plaintext)
    }

    /// Decrypt a buffer of one or more complete frames.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            if offset + 2 > data.len() {
                return Err(CryptoError::Decryption(
                    "Incomplete length prefix".to_string(),
                ));
            }

            let frame_len = u16::from_le_bytes([data[offset], data[offset + 1]]);
            offset += 2;

            let frame_end = offset + frame_len as usize + TAG_LEN;
            if frame_end > data.len() {
                return Err(CryptoError::Decryption(
                    "Incomplete ciphertext frame".to_string(),
                ));
            }

            let plaintext = self.decrypt_frame(&data[offset..frame_end], frame_len)?;
            out.extend_from_slice(&plaintext);
            offset = frame_end;
        }

        Ok(out)
    }

    pub fn encrypt_counter(&self) -> u64 {
        self.encrypt_counter
    }

    pub fn decrypt_counter(&self) -> u64 {
        self.decrypt_counter
    }
}
