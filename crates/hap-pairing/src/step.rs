//! Outcome of a single pair-setup or pair-verify step.

use hap_core::error::{CryptoError, Error, ErrorCode, PairingError, ParseError};
use thiserror::Error;

pub(crate) type StepResult<T> = std::result::Result<T, StepError>;

/// A rejected step, answered on the wire with `state` + `error`.
///
/// `reason` is for logs only and never carries key material.
#[derive(Debug, Error)]
#[error("{code}: {reason}")]
pub(crate) struct StepError {
    pub code: ErrorCode,
    pub reason: String,
    /// Discard the in-flight pair-setup attempt.
    pub resets_attempt: bool,
}

impl StepError {
    fn new(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            resets_attempt: false,
        }
    }

    /// Request that cannot be acted on (missing fields, wrong state).
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, reason)
    }

    /// Proof, decryption or signature check failed.
    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Authentication, reason)
    }

    /// Refused by device policy before any cryptography ran.
    pub fn policy(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self::new(code, reason)
    }

    /// Failure inside the accessory; the attempt cannot continue.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, reason).resetting()
    }

    pub fn resetting(mut self) -> Self {
        self.resets_attempt = true;
        self
    }

    pub fn is_authentication(&self) -> bool {
        self.code == ErrorCode::Authentication
    }
}

impl From<ParseError> for StepError {
    fn from(e: ParseError) -> Self {
        Self::malformed(e.to_string())
    }
}

impl From<PairingError> for StepError {
    fn from(e: PairingError) -> Self {
        match e {
            PairingError::MissingTlv(_) | PairingError::StateMismatch { .. } => {
                Self::malformed(e.to_string())
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<CryptoError> for StepError {
    fn from(e: CryptoError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<Error> for StepError {
    fn from(e: Error) -> Self {
        Self::internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_is_unknown_without_reset() {
        let err: StepError = PairingError::MissingTlv(0x03).into();
        assert_eq!(err.code, ErrorCode::Unknown);
        assert!(!err.resets_attempt);
    }

    #[test]
    fn internal_failures_reset_attempt() {
        let err: StepError = CryptoError::KeyDerivation("hkdf".to_string()).into();
        assert_eq!(err.code, ErrorCode::Unknown);
        assert!(err.resets_attempt);

        let err: StepError = Error::Pairing(PairingError::DuplicatePairing("ctrl".into())).into();
        assert!(err.resets_attempt);
    }

    #[test]
    fn authentication_is_flagged() {
        let err = StepError::authentication("bad proof");
        assert!(err.is_authentication());
        assert!(!err.resets_attempt);
        assert!(err.resetting().resets_attempt);
        assert!(!StepError::policy(ErrorCode::Busy, "busy").is_authentication());
    }

    #[test]
    fn display_includes_code_and_reason() {
        let err = StepError::policy(ErrorCode::MaxTries, "101 failures");
        let rendered = err.to_string();
        assert!(rendered.contains("MaxTries"));
        assert!(rendered.contains("101 failures"));
    }
}
