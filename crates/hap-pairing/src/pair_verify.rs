//! Accessory side of HomeKit pair-verify (M1-M4).
//!
//! Station-to-station key agreement: both sides exchange ephemeral X25519
//! keys, sign the transcript with their Ed25519 long-term keys, and derive
//! the transport keys for the connection from the shared secret.

use crate::server::PairingServer;
use crate::session::{ConnectionId, VerifyContext};
use crate::step::{StepError, StepResult};
use hap_crypto::{
    chacha,
    curve25519::{self, EcdhKeyPair},
    ed25519,
    keys::{SessionKeys, SharedSecret},
    tlv::{Tlv8, TlvType},
};
use tracing::{debug, info};

/// Nonce for pair-verify M2 encryption.
pub(crate) const PV_MSG02_NONCE: &[u8] = b"PV-Msg02";
/// Nonce for pair-verify M3 decryption.
pub(crate) const PV_MSG03_NONCE: &[u8] = b"PV-Msg03";

/// `signer_ecdh || identifier || peer_ecdh`, the payload each side signs.
pub(crate) fn signed_message(signer_ecdh: &[u8], identifier: &[u8], peer_ecdh: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(signer_ecdh.len() + identifier.len() + peer_ecdh.len());
    message.extend_from_slice(signer_ecdh);
    message.extend_from_slice(identifier);
    message.extend_from_slice(peer_ecdh);
    message
}

impl PairingServer {
    /// Run one pair-verify step and build the success response.
    pub(crate) async fn pair_verify_step(&self, conn: ConnectionId, request: &Tlv8) -> StepResult<Tlv8> {
        let result = match request.state().unwrap_or(0) {
            0x01 => self.verify_m1(conn, request).await,
            0x03 => self.verify_m3(conn, request).await,
            other => Err(StepError::malformed(format!(
                "unexpected pair-verify state {}",
                other
            ))),
        };

        if let Err(err) = &result {
            if err.is_authentication() {
                self.state.record_failed_auth();
            }
        }
        result
    }

    /// M1 -> M2: answer with our ephemeral key and signed identity.
    async fn verify_m1(&self, conn: ConnectionId, request: &Tlv8) -> StepResult<Tlv8> {
        let controller_public = curve25519::peer_key(request.require(TlvType::PublicKey)?)?;

        let ecdh = EcdhKeyPair::generate();
        let accessory_public = ecdh.public_key();
        let shared = SharedSecret::new(ecdh.diffie_hellman(&controller_public)?.to_vec());

        let device_id = self.config.device_id.to_mac_string();
        let info = signed_message(&accessory_public, device_id.as_bytes(), &controller_public);
        let signature = self.identity.sign(&info);

        let session_key = SessionKeys::derive_pair_verify_key(&shared)?;
        let sub_tlv = Tlv8::new()
            .with(TlvType::Identifier, device_id.into_bytes())
            .with(TlvType::Signature, signature.to_vec());
        let encrypted = chacha::encrypt(session_key.as_bytes(), PV_MSG02_NONCE, &sub_tlv.encode())?;

        let context = VerifyContext::new(accessory_public, controller_public, shared, session_key);
        if self.sessions.insert(conn, context).await.is_some() {
            debug!(%conn, "pair-verify restarted, previous context replaced");
        }

        debug!(%conn, "pair-verify M1 accepted, sending M2");
        Ok(Tlv8::new()
            .with(TlvType::State, [0x02])
            .with(TlvType::EncryptedData, encrypted)
            .with(TlvType::PublicKey, accessory_public.to_vec()))
    }

    /// M3 -> M4: authenticate the controller and switch the connection to
    /// encrypted framing.
    async fn verify_m3(&self, conn: ConnectionId, request: &Tlv8) -> StepResult<Tlv8> {
        let context = self
            .sessions
            .get(conn)
            .await
            .ok_or_else(|| StepError::malformed("no pair-verify context for connection"))?;
        if context.is_verified() {
            return Err(StepError::malformed("connection is already verified"));
        }

        let sealed = request.require(TlvType::EncryptedData)?;
        let plaintext = chacha::decrypt_sealed(context.session_key.as_bytes(), PV_MSG03_NONCE, sealed)
            .map_err(|_| StepError::authentication("M3 payload failed to decrypt"))?;

        let info = Tlv8::parse(&plaintext)?;
        let identifier = info.require(TlvType::Identifier)?;
        let signature = info.require(TlvType::Signature)?;

        let pairing = self.store.get_pairing(identifier).await.ok_or_else(|| {
            StepError::authentication(format!(
                "unknown controller {}",
                String::from_utf8_lossy(identifier)
            ))
        })?;

        let message = signed_message(&context.controller_public, identifier, &context.accessory_public);
        ed25519::verify_slice(&pairing.public_key, &message, signature).map_err(|e| {
            StepError::authentication(format!("controller signature rejected: {}", e))
        })?;

        let keys = SessionKeys::derive_accessory_keys(&context.shared_secret)?;
        let switched = match self.connections.mark_encrypted(conn, keys.clone()).await {
            Ok(()) => self.connections.keep_alive_forever(conn).await,
            Err(e) => Err(e),
        };
        if let Err(e) = switched {
            self.sessions.close(conn).await;
            return Err(e.into());
        }
        if !self.sessions.complete(conn, keys).await {
            return Err(StepError::internal("pair-verify context closed during M3"));
        }

        info!(%conn, controller = %pairing.identifier_lossy(), "pair-verify complete");
        Ok(Tlv8::new().with(TlvType::State, [0x04]))
    }
}
