//! Accessory identity, configuration and pairing record types.

use crate::error::{ConfigError, ParseError};
use std::fmt;
use std::time::Duration;

/// Default window after which an unfinished pair-setup attempt may be replaced.
pub const DEFAULT_PAIR_SETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ceiling on failed authentication attempts before lockout.
pub const DEFAULT_MAX_FAILED_AUTH: u32 = 100;

/// Accessory device identifier, a MAC-style 6-byte address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub [u8; 6]);

impl DeviceId {
    /// Parse a MAC address from string.
    ///
    /// Supports formats:
    /// - Colon-separated: "AA:BB:CC:DD:EE:FF"
    /// - Hyphen-separated: "AA-BB-CC-DD-EE-FF"
    /// - Bare hex: "AABBCCDDEEFF"
    pub fn from_mac_string(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();

        let bytes: Vec<u8> = match s.find(|c| c == ':' || c == '-') {
            Some(idx) => {
                let sep = s.as_bytes()[idx] as char;
                s.split(sep)
                    .map(|part| {
                        if part.len() != 2 {
                            return Err(ParseError::InvalidHex(part.to_string()));
                        }
                        u8::from_str_radix(part, 16)
                            .map_err(|_| ParseError::InvalidHex(part.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                if s.len() != 12 || !s.is_ascii() {
                    return Err(ParseError::InvalidFormat(format!(
                        "MAC address must be 12 hex characters, got {}",
                        s.len()
                    )));
                }
                (0..6)
                    .map(|i| {
                        let part = &s[i * 2..i * 2 + 2];
                        u8::from_str_radix(part, 16)
                            .map_err(|_| ParseError::InvalidHex(part.to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        if bytes.len() != 6 {
            return Err(ParseError::InvalidFormat(format!(
                "MAC address must have 6 bytes, got {}",
                bytes.len()
            )));
        }

        let mut arr = [0u8; 6];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Convert to colon-separated MAC string (uppercase).
    ///
    /// This is the form carried in the `identifier` TLV and covered by the
    /// accessory's handshake signatures.
    pub fn to_mac_string(&self) -> String {
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_mac_string())
    }
}

/// Accessory category advertised to controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Category(u8);

impl Category {
    pub const OTHER: Category = Category(1);
    pub const BRIDGE: Category = Category(2);
    pub const FAN: Category = Category(3);
    pub const LIGHTBULB: Category = Category(5);
    pub const DOOR_LOCK: Category = Category(6);
    pub const OUTLET: Category = Category(7);
    pub const SWITCH: Category = Category(8);
    pub const THERMOSTAT: Category = Category(9);
    pub const SENSOR: Category = Category(10);

    /// Validate a raw category number (1 through 19).
    pub fn new(value: u8) -> Result<Self, ConfigError> {
        if (1..20).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidCategory(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Human-entered setup code in the form `NNN-NN-NNN`.
///
/// The code seeds the SRP verifier. `Debug` never prints the digits.
#[derive(Clone, PartialEq, Eq)]
pub struct SetupCode(String);

impl SetupCode {
    /// Validate and wrap a setup code.
    pub fn parse(code: &str) -> Result<Self, ConfigError> {
        let bytes = code.as_bytes();
        let well_formed = bytes.len() == 10
            && bytes.iter().enumerate().all(|(i, b)| match i {
                3 | 6 => *b == b'-',
                _ => b.is_ascii_digit(),
            });

        if well_formed {
            Ok(Self(code.to_string()))
        } else {
            Err(ConfigError::InvalidSetupCode(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SetupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SetupCode(***-**-***)")
    }
}

/// A trusted controller, created by a completed pair-setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRecord {
    /// Controller pairing identifier, opaque bytes (usually a UUID string).
    pub identifier: Vec<u8>,
    /// Controller Ed25519 long-term public key.
    pub public_key: [u8; 32],
    pub is_admin: bool,
}

impl PairingRecord {
    pub fn new(identifier: impl Into<Vec<u8>>, public_key: [u8; 32], is_admin: bool) -> Self {
        Self {
            identifier: identifier.into(),
            public_key,
            is_admin,
        }
    }

    /// Identifier rendered for logs.
    pub fn identifier_lossy(&self) -> String {
        String::from_utf8_lossy(&self.identifier).into_owned()
    }
}

/// Validated accessory configuration read by the pairing server.
#[derive(Debug, Clone)]
pub struct AccessoryConfig {
    pub name: String,
    pub device_id: DeviceId,
    pub category: Category,
    pub setup_code: SetupCode,
    /// Age after which another connection may replace an in-flight pair-setup.
    pub pair_setup_timeout: Duration,
    /// Failed-authentication count above which pair-setup answers `maxTries`.
    pub max_failed_auth: u32,
}

impl AccessoryConfig {
    pub fn builder() -> AccessoryConfigBuilder {
        AccessoryConfigBuilder::new()
    }
}

/// Builder for [`AccessoryConfig`].
#[derive(Debug)]
pub struct AccessoryConfigBuilder {
    name: Option<String>,
    device_id: Option<String>,
    category: u8,
    setup_code: Option<String>,
    pair_setup_timeout: Duration,
    max_failed_auth: u32,
}

impl AccessoryConfigBuilder {
    /// Create new builder with defaults.
    pub fn new() -> Self {
        Self {
            name: None,
            device_id: None,
            category: Category::OTHER.value(),
            setup_code: None,
            pair_setup_timeout: DEFAULT_PAIR_SETUP_TIMEOUT,
            max_failed_auth: DEFAULT_MAX_FAILED_AUTH,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set device id as a MAC string.
    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }

    pub fn category(mut self, category: u8) -> Self {
        self.category = category;
        self
    }

    pub fn setup_code(mut self, code: impl Into<String>) -> Self {
        self.setup_code = Some(code.into());
        self
    }

    pub fn pair_setup_timeout(mut self, timeout: Duration) -> Self {
        self.pair_setup_timeout = timeout;
        self
    }

    pub fn max_failed_auth(mut self, max: u32) -> Self {
        self.max_failed_auth = max;
        self
    }

    /// Validate every field and build the configuration.
    pub fn build(self) -> Result<AccessoryConfig, ConfigError> {
        let name = self.name.ok_or(ConfigError::Missing("name"))?;
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        let device_id = self.device_id.ok_or(ConfigError::Missing("device_id"))?;
        let device_id = DeviceId::from_mac_string(&device_id)?;

        let setup_code = self.setup_code.ok_or(ConfigError::Missing("setup_code"))?;
        let setup_code = SetupCode::parse(&setup_code)?;

        Ok(AccessoryConfig {
            name,
            device_id,
            category: Category::new(self.category)?,
            setup_code,
            pair_setup_timeout: self.pair_setup_timeout,
            max_failed_auth: self.max_failed_auth,
        })
    }
}

impl Default for AccessoryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
