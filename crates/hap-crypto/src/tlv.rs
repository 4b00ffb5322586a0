//! TLV8 encoding/decoding for HomeKit pairing messages.
//!
//! TLV8 format: [Type: 1 byte][Length: 1 byte][Value: 0-255 bytes]
//! Values longer than 255 bytes are fragmented across consecutive records
//! sharing the same type.

use hap_core::error::{ErrorCode, PairingError, ParseError};

/// Maximum value bytes carried by one record.
pub const MAX_FRAGMENT_LEN: usize = 255;

/// TLV type constants for HomeKit pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    Method = 0x00,
    Identifier = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    Proof = 0x04,
    EncryptedData = 0x05,
    State = 0x06,
    Error = 0x07,
    RetryDelay = 0x08,
    Certificate = 0x09,
    Signature = 0x0A,
    Permissions = 0x0B,
    FragmentData = 0x0C,
    FragmentLast = 0x0D,
    Separator = 0xFF,
}

impl TlvType {
    /// Convert from raw byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Method),
            0x01 => Some(Self::Identifier),
            0x02 => Some(Self::Salt),
            0x03 => Some(Self::PublicKey),
            0x04 => Some(Self::Proof),
            0x05 => Some(Self::EncryptedData),
            0x06 => Some(Self::State),
            0x07 => Some(Self::Error),
            0x08 => Some(Self::RetryDelay),
            0x09 => Some(Self::Certificate),
            0x0A => Some(Self::Signature),
            0x0B => Some(Self::Permissions),
            0x0C => Some(Self::FragmentData),
            0x0D => Some(Self::FragmentLast),
            0xFF => Some(Self::Separator),
            _ => None,
        }
    }
}

/// Pairing method carried in the `Method` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Method {
    PairSetup = 0x00,
    PairSetupWithAuth = 0x01,
    PairVerify = 0x02,
    AddPairing = 0x03,
    RemovePairing = 0x04,
    ListPairings = 0x05,
}

impl Method {
    /// Convert from raw byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::PairSetup),
            0x01 => Some(Self::PairSetupWithAuth),
            0x02 => Some(Self::PairVerify),
            0x03 => Some(Self::AddPairing),
            0x04 => Some(Self::RemovePairing),
            0x05 => Some(Self::ListPairings),
            _ => None,
        }
    }
}

/// Parsed TLV8 message.
///
/// Entries keep the order they were parsed or inserted in. Types outside
/// [`TlvType`] are retained as opaque bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tlv8 {
    items: Vec<(u8, Vec<u8>)>,
}

impl Tlv8 {
    /// Create empty TLV8 message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TLV8 from bytes.
    ///
    /// Consecutive records with the same type are concatenated in stream
    /// order. A record truncated by the end of input is an error.
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let mut items: Vec<(u8, Vec<u8>)> = Vec::new();
        let mut i = 0;

        while i < data.len() {
            if i + 2 > data.len() {
                return Err(ParseError::InvalidFormat(
                    "TLV8: truncated header".to_string(),
                ));
            }

            let typ = data[i];
            let len = data[i + 1] as usize;
            i += 2;

            if i + len > data.len() {
                return Err(ParseError::InvalidFormat(format!(
                    "TLV8: truncated value (expected {} bytes, got {})",
                    len,
                    data.len() - i
                )));
            }

            let value = &data[i..i + len];
            i += len;

            match items.last_mut() {
                Some((last, existing)) if *last == typ => existing.extend_from_slice(value),
                _ => items.push((typ, value.to_vec())),
            }
        }

        Ok(Self { items })
    }

    /// Encode to bytes in insertion order.
    ///
    /// Values > 255 bytes are fragmented; an empty value is one zero-length
    /// record.
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.encoded_len());

        for (typ, value) in &self.items {
            if value.is_empty() {
                result.push(*typ);
                result.push(0);
                continue;
            }
            for chunk in value.chunks(MAX_FRAGMENT_LEN) {
                result.push(*typ);
                result.push(chunk.len() as u8);
                result.extend_from_slice(chunk);
            }
        }

        result
    }

    fn encoded_len(&self) -> usize {
        self.items
            .iter()
            .map(|(_, v)| v.len() + 2 * v.len().div_ceil(MAX_FRAGMENT_LEN).max(1))
            .sum()
    }

    /// Get value for type.
    pub fn get(&self, typ: TlvType) -> Option<&[u8]> {
        self.get_raw(typ as u8)
    }

    /// Get value for raw type.
    pub fn get_raw(&self, typ: u8) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(t, _)| *t == typ)
            .map(|(_, v)| v.as_slice())
    }

    /// Get a value that the current step cannot proceed without.
    pub fn require(&self, typ: TlvType) -> Result<&[u8], PairingError> {
        self.get(typ).ok_or(PairingError::MissingTlv(typ as u8))
    }

    /// Set value for type, replacing an existing entry in place.
    pub fn set(&mut self, typ: TlvType, value: impl Into<Vec<u8>>) {
        self.set_raw(typ as u8, value);
    }

    /// Set value for raw type, replacing an existing entry in place.
    pub fn set_raw(&mut self, typ: u8, value: impl Into<Vec<u8>>) {
        let value = value.into();
        match self.items.iter_mut().find(|(t, _)| *t == typ) {
            Some((_, existing)) => *existing = value,
            None => self.items.push((typ, value)),
        }
    }

    /// Builder form of [`Tlv8::set`].
    pub fn with(mut self, typ: TlvType, value: impl Into<Vec<u8>>) -> Self {
        self.set(typ, value);
        self
    }

    /// Check if type is present.
    pub fn contains(&self, typ: TlvType) -> bool {
        self.get(typ).is_some()
    }

    /// Iterate entries in order as (raw type, value).
    pub fn iter(&self) -> impl Iterator<Item = (u8, &[u8])> {
        self.items.iter().map(|(t, v)| (*t, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get state value (single byte).
    pub fn state(&self) -> Option<u8> {
        self.get(TlvType::State).and_then(|v| v.first().copied())
    }

    /// Get error code, if the record holds a known one.
    pub fn error(&self) -> Option<ErrorCode> {
        self.get(TlvType::Error)
            .and_then(|v| v.first().copied())
            .and_then(ErrorCode::from_byte)
    }

    /// Get pairing method, if the record holds a known one.
    pub fn method(&self) -> Option<Method> {
        self.get(TlvType::Method)
            .and_then(|v| v.first().copied())
            .and_then(Method::from_byte)
    }

    /// Error reply: the request's state followed by the error code.
    pub fn error_response(code: ErrorCode, state: u8) -> Self {
        Self::new()
            .with(TlvType::State, [state])
            .with(TlvType::Error, [code.as_byte()])
    }

    /// Create M1 pair-setup request.
    pub fn pair_setup_m1() -> Self {
        Self::new()
            .with(TlvType::State, [0x01])
            .with(TlvType::Method, [Method::PairSetup as u8])
    }

    /// Create M1 pair-verify request with public key.
    pub fn pair_verify_m1(public_key: &[u8; 32]) -> Self {
        Self::new()
            .with(TlvType::State, [0x01])
            .with(TlvType::PublicKey, public_key.to_vec())
    }
}
