//! # hap-core
//!
//! Types and error definitions shared by the accessory pairing crates.
//!
//! This crate provides:
//! - Device identifier, category and setup code validation
//! - Accessory configuration consumed by the pairing server
//! - Pairing records for trusted controllers
//! - Common error types and the wire-level pairing error codes

pub mod device;
pub mod error;

pub use device::{AccessoryConfig, AccessoryConfigBuilder, Category, DeviceId, PairingRecord, SetupCode};
pub use error::{ConfigError, CryptoError, Error, ErrorCode, PairingError, ParseError, Result};
