//! # hap-crypto
//!
//! Cryptographic primitives for HomeKit accessory pairing.
//!
//! This crate provides:
//! - TLV8 codec for pairing messages
//! - SRP-6a (3072-bit) for pair-setup
//! - Curve25519 ECDH for pair-verify key agreement
//! - Ed25519 for long-term identity signatures
//! - ChaCha20-Poly1305 for handshake sub-messages and transport frames
//! - HKDF-SHA512 for key derivation
//!
//! All secret material is zeroized on drop.

pub mod chacha;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod srp;
pub mod tlv;

pub use chacha::FrameCipher;
pub use curve25519::EcdhKeyPair;
pub use ed25519::IdentityKeyPair;
pub use keys::{EncryptionKey, SessionKeys, SharedSecret};
pub use srp::{SrpClient, SrpServer};
pub use tlv::{Method, Tlv8, TlvType};
