//! Accessory pairing endpoints.
//!
//! [`PairingServer`] owns the device-wide pairing state and turns request
//! bodies for `/pair-setup` and `/pair-verify` into response bodies. Every
//! failure becomes a `state` + `error` TLV; nothing here tears down the
//! connection.

use crate::channel::EncryptedChannel;
use crate::session::{ConnectionId, SessionRegistry};
use crate::state::DeviceState;
use crate::traits::{ConnectionControl, PairingStore};
use hap_core::device::AccessoryConfig;
use hap_core::error::ErrorCode;
use hap_crypto::ed25519::IdentityKeyPair;
use hap_crypto::tlv::Tlv8;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Media type of pairing request and response bodies.
pub const PAIRING_CONTENT_TYPE: &str = "application/pairing+tlv8";
pub const PAIR_SETUP_PATH: &str = "/pair-setup";
pub const PAIR_VERIFY_PATH: &str = "/pair-verify";

/// HTTP-level answer to a pairing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingResponse {
    pub status: u16,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl PairingResponse {
    fn tlv(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(PAIRING_CONTENT_TYPE),
            body,
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }
}

/// Pairing engine for one accessory.
pub struct PairingServer {
    pub(crate) config: AccessoryConfig,
    pub(crate) identity: IdentityKeyPair,
    pub(crate) state: DeviceState,
    pub(crate) sessions: SessionRegistry,
    pub(crate) store: Arc<dyn PairingStore>,
    pub(crate) connections: Arc<dyn ConnectionControl>,
}

impl PairingServer {
    /// Create a server for the accessory described by `config`, signing with
    /// its long-term `identity` key.
    pub fn new(
        config: AccessoryConfig,
        identity: IdentityKeyPair,
        store: Arc<dyn PairingStore>,
        connections: Arc<dyn ConnectionControl>,
    ) -> Self {
        Self {
            config,
            identity,
            state: DeviceState::new(),
            sessions: SessionRegistry::new(),
            store,
            connections,
        }
    }

    pub fn config(&self) -> &AccessoryConfig {
        &self.config
    }

    /// Accessory Ed25519 long-term public key.
    pub fn accessory_public_key(&self) -> [u8; 32] {
        self.identity.public_key()
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Handle a `/pair-setup` body, returning the response body.
    pub async fn pair_setup(&self, conn: ConnectionId, body: &[u8]) -> Vec<u8> {
        self.pair_setup_at(conn, body, Instant::now()).await
    }

    /// [`pair_setup`](Self::pair_setup) with an explicit clock reading for the
    /// staleness window.
    pub async fn pair_setup_at(&self, conn: ConnectionId, body: &[u8], now: Instant) -> Vec<u8> {
        let request = match Tlv8::parse(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(%conn, error = %e, "malformed pair-setup body");
                return Tlv8::error_response(ErrorCode::Unknown, 0).encode();
            }
        };
        let state = request.state().unwrap_or(0);
        debug!(%conn, state, "pair-setup request");

        match self.pair_setup_step(conn, &request, now).await {
            Ok(response) => response.encode(),
            Err(err) => {
                warn!(%conn, state, code = %err.code, reason = %err.reason, "pair-setup rejected");
                Tlv8::error_response(err.code, state).encode()
            }
        }
    }

    /// Handle a `/pair-verify` body, returning the response body.
    ///
    /// After a successful M3 the transport has already been told to encrypt;
    /// the returned M4 body itself goes out in plaintext.
    pub async fn pair_verify(&self, conn: ConnectionId, body: &[u8]) -> Vec<u8> {
        let request = match Tlv8::parse(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(%conn, error = %e, "malformed pair-verify body");
                return Tlv8::error_response(ErrorCode::Unknown, 0).encode();
            }
        };
        let state = request.state().unwrap_or(0);
        debug!(%conn, state, "pair-verify request");

        match self.pair_verify_step(conn, &request).await {
            Ok(response) => response.encode(),
            Err(err) => {
                warn!(%conn, state, code = %err.code, reason = %err.reason, "pair-verify rejected");
                Tlv8::error_response(err.code, state).encode()
            }
        }
    }

    /// Route a request by path, checking the body's media type.
    pub async fn handle(
        &self,
        path: &str,
        content_type: Option<&str>,
        conn: ConnectionId,
        body: &[u8],
    ) -> PairingResponse {
        if path != PAIR_SETUP_PATH && path != PAIR_VERIFY_PATH {
            return PairingResponse::empty(404);
        }
        if !content_type.is_some_and(is_pairing_media_type) {
            debug!(%conn, path, ?content_type, "unsupported pairing media type");
            return PairingResponse::empty(415);
        }

        let body = if path == PAIR_SETUP_PATH {
            self.pair_setup(conn, body).await
        } else {
            self.pair_verify(conn, body).await
        };
        PairingResponse::tlv(body)
    }

    /// Drop everything held for a closed connection.
    pub async fn connection_closed(&self, conn: ConnectionId) {
        if self.sessions.close(conn).await {
            debug!(%conn, "pair-verify context destroyed");
        }
    }

    /// Encrypted channel for a connection that completed pair-verify.
    pub async fn open_channel(&self, conn: ConnectionId) -> Option<EncryptedChannel> {
        self.sessions
            .transport_keys(conn)
            .await
            .map(|keys| EncryptedChannel::new(&keys))
    }
}

fn is_pairing_media_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(PAIRING_CONTENT_TYPE))
}
