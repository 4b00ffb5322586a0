//! Error types for the HomeKit accessory pairing engine.

use thiserror::Error;

/// Primary error type for all accessory pairing operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),
}

/// Errors raised while driving a pair-setup or pair-verify exchange.
#[derive(Error, Debug)]
pub enum PairingError {
    #[error("SRP proof verification failed")]
    SrpVerificationFailed,

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Unknown controller: {0}")]
    UnknownController(String),

    #[error("Controller already paired: {0}")]
    DuplicatePairing(String),

    #[error("Pairing state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: u8, actual: u8 },

    #[error("Missing required TLV type: {0}")]
    MissingTlv(u8),

    #[error("Invalid pairing state: {0}")]
    InvalidState(String),

    #[error("Peer reported error: {0}")]
    Rejected(ErrorCode),
}

/// Cryptographic operation errors.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Authentication tag mismatch")]
    AuthTagMismatch,
}

/// Parsing errors for wire and text formats.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid hex value: {0}")]
    InvalidHex(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Accessory configuration errors. Raised at configuration time, never
/// while a handshake is running.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid setup code {0:?}: expected NNN-NN-NNN")]
    InvalidSetupCode(String),

    #[error("Invalid device id: {0}")]
    InvalidDeviceId(#[from] ParseError),

    #[error("Invalid category {0}: must be between 1 and 19")]
    InvalidCategory(u8),

    #[error("Accessory name must not be empty")]
    EmptyName,

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Pairing error codes carried in the `error` TLV.
///
/// The numbering is fixed by the accessory protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Unknown = 0x01,
    Authentication = 0x02,
    BackOff = 0x03,
    MaxPeers = 0x04,
    MaxTries = 0x05,
    Unavailable = 0x06,
    Busy = 0x07,
}

impl ErrorCode {
    /// Convert from raw byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Unknown),
            0x02 => Some(Self::Authentication),
            0x03 => Some(Self::BackOff),
            0x04 => Some(Self::MaxPeers),
            0x05 => Some(Self::MaxTries),
            0x06 => Some(Self::Unavailable),
            0x07 => Some(Self::Busy),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Authentication => "Authentication",
            Self::BackOff => "Backoff (rate limited)",
            Self::MaxPeers => "MaxPeers",
            Self::MaxTries => "MaxTries",
            Self::Unavailable => "Unavailable",
            Self::Busy => "Busy",
        };
        write!(f, "0x{:02x} {}", self.as_byte(), name)
    }
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
