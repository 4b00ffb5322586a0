//! Accessory side of HomeKit pair-setup (M1-M6).
//!
//! M1/M2 start an SRP-6a exchange seeded by the setup code, M3/M4 prove both
//! sides know the code, and M5/M6 swap Ed25519 long-term keys under the
//! SRP-derived key. A successful M5 stores the controller as an admin.

use crate::server::PairingServer;
use crate::session::ConnectionId;
use crate::state::SetupAttempt;
use crate::step::{StepError, StepResult};
use hap_core::device::PairingRecord;
use hap_core::error::ErrorCode;
use hap_crypto::{
    chacha, ed25519, hkdf,
    keys::SessionKeys,
    srp::SrpServer,
    tlv::{Tlv8, TlvType},
};
use std::time::Instant;
use tracing::{debug, info};

/// Nonce for pair-setup M5 decryption.
pub(crate) const PS_MSG05_NONCE: &[u8] = b"PS-Msg05";
/// Nonce for pair-setup M6 encryption.
pub(crate) const PS_MSG06_NONCE: &[u8] = b"PS-Msg06";

impl PairingServer {
    /// Run one pair-setup step and build the success response.
    pub(crate) async fn pair_setup_step(
        &self,
        conn: ConnectionId,
        request: &Tlv8,
        now: Instant,
    ) -> StepResult<Tlv8> {
        if self.store.is_paired().await {
            return Err(StepError::policy(
                ErrorCode::Unavailable,
                "accessory is already paired",
            ));
        }

        let failures = self.state.failed_auth_count();
        if failures > self.config.max_failed_auth {
            return Err(StepError::policy(
                ErrorCode::MaxTries,
                format!("{} failed authentication attempts", failures),
            ));
        }

        let mut attempt = self.state.attempt().await;
        // Any failure after M1 abandons the attempt so it cannot hold the
        // device busy.
        let result = match request.state().unwrap_or(0) {
            0x01 => self.setup_m1(conn, request, &mut attempt, now),
            0x03 => self
                .setup_m3(conn, request, &mut attempt, now)
                .map_err(StepError::resetting),
            0x05 => self
                .setup_m5(conn, request, &mut attempt, now)
                .await
                .map_err(StepError::resetting),
            other => Err(StepError::malformed(format!(
                "unexpected pair-setup state {}",
                other
            ))),
        };

        if let Err(err) = &result {
            if err.is_authentication() {
                self.state.record_failed_auth();
            }
            if err.resets_attempt {
                *attempt = None;
            }
        }
        result
    }

    /// M1 -> M2: start a new SRP exchange owned by this connection.
    fn setup_m1(
        &self,
        conn: ConnectionId,
        request: &Tlv8,
        attempt: &mut Option<SetupAttempt>,
        now: Instant,
    ) -> StepResult<Tlv8> {
        debug!(%conn, method = ?request.method(), "pair-setup M1");

        if let Some(current) = attempt.as_ref() {
            if current.owner() != conn && !current.is_stale(now, self.config.pair_setup_timeout) {
                return Err(StepError::policy(
                    ErrorCode::Busy,
                    format!("pair-setup in progress on {}", current.owner()),
                ));
            }
        }

        let srp = SrpServer::new(&self.config.setup_code);
        let response = Tlv8::new()
            .with(TlvType::State, [0x02])
            .with(TlvType::PublicKey, srp.public_key())
            .with(TlvType::Salt, srp.salt().to_vec());

        if let Some(previous) = attempt.replace(SetupAttempt::new(conn, srp, now)) {
            debug!(%conn, previous = %previous.owner(), "replaced earlier pair-setup attempt");
        }
        debug!(%conn, "pair-setup M1 accepted, sending M2");
        Ok(response)
    }

    /// M3 -> M4: check the controller's SRP proof and answer with ours.
    fn setup_m3(
        &self,
        conn: ConnectionId,
        request: &Tlv8,
        attempt: &mut Option<SetupAttempt>,
        now: Instant,
    ) -> StepResult<Tlv8> {
        let current = resume_attempt(attempt, conn, now)?;
        let client_public = request.require(TlvType::PublicKey)?;
        let client_proof = request.require(TlvType::Proof)?;

        let srp = current.srp_mut();
        srp.set_client_public_key(client_public)
            .map_err(|e| StepError::authentication(e.to_string()).resetting())?;

        if !srp.verify_client_proof(client_proof) {
            return Err(StepError::authentication("SRP proof mismatch").resetting());
        }

        let proof = srp
            .server_proof()
            .ok_or_else(|| StepError::internal("server proof unavailable after verification"))?;

        debug!(%conn, "pair-setup M3 verified, sending M4");
        Ok(Tlv8::new()
            .with(TlvType::State, [0x04])
            .with(TlvType::Proof, proof.to_vec()))
    }

    /// M5 -> M6: store the controller's long-term key and send ours.
    async fn setup_m5(
        &self,
        conn: ConnectionId,
        request: &Tlv8,
        attempt: &mut Option<SetupAttempt>,
        now: Instant,
    ) -> StepResult<Tlv8> {
        let current = resume_attempt(attempt, conn, now)?;
        let shared_secret = current
            .srp()
            .session_key()
            .ok_or_else(|| StepError::internal("M5 received before a verified M3"))?;
        let sealed = request.require(TlvType::EncryptedData)?;

        let key = SessionKeys::derive_pair_setup_key(shared_secret)?;
        let plaintext = chacha::decrypt_sealed(key.as_bytes(), PS_MSG05_NONCE, sealed)
            .map_err(|_| StepError::authentication("M5 payload failed to decrypt").resetting())?;

        let info = Tlv8::parse(&plaintext)?;
        let identifier = info.require(TlvType::Identifier)?;
        let controller_ltpk = info.require(TlvType::PublicKey)?;
        let signature = info.require(TlvType::Signature)?;

        // iOSDeviceX || iOSDevicePairingID || iOSDeviceLTPK
        let controller_x = hkdf::derive_controller_sign_key(shared_secret.as_bytes())?;
        let mut controller_info =
            Vec::with_capacity(controller_x.len() + identifier.len() + controller_ltpk.len());
        controller_info.extend_from_slice(&controller_x);
        controller_info.extend_from_slice(identifier);
        controller_info.extend_from_slice(controller_ltpk);

        ed25519::verify_slice(controller_ltpk, &controller_info, signature).map_err(|e| {
            StepError::authentication(format!("controller signature rejected: {}", e)).resetting()
        })?;

        let controller_ltpk: [u8; 32] = controller_ltpk
            .try_into()
            .map_err(|_| StepError::malformed("controller public key must be 32 bytes"))?;

        // AccessoryX || AccessoryPairingID || AccessoryLTPK
        let accessory_x = hkdf::derive_accessory_sign_key(shared_secret.as_bytes())?;
        let device_id = self.config.device_id.to_mac_string();
        let accessory_ltpk = self.identity.public_key();
        let mut accessory_info = Vec::with_capacity(32 + device_id.len() + 32);
        accessory_info.extend_from_slice(&accessory_x);
        accessory_info.extend_from_slice(device_id.as_bytes());
        accessory_info.extend_from_slice(&accessory_ltpk);
        let accessory_signature = self.identity.sign(&accessory_info);

        let sub_tlv = Tlv8::new()
            .with(TlvType::Identifier, device_id.into_bytes())
            .with(TlvType::PublicKey, accessory_ltpk.to_vec())
            .with(TlvType::Signature, accessory_signature.to_vec());
        let encrypted = chacha::encrypt(key.as_bytes(), PS_MSG06_NONCE, &sub_tlv.encode())?;

        let record = PairingRecord::new(identifier, controller_ltpk, true);
        let controller = record.identifier_lossy();
        self.store.add_pairing(record).await?;

        *attempt = None;
        info!(%conn, %controller, "pair-setup complete, controller paired as admin");

        Ok(Tlv8::new()
            .with(TlvType::State, [0x06])
            .with(TlvType::EncryptedData, encrypted))
    }
}

/// The device's in-flight attempt, continued from `conn`.
fn resume_attempt(
    attempt: &mut Option<SetupAttempt>,
    conn: ConnectionId,
    now: Instant,
) -> StepResult<&mut SetupAttempt> {
    let current = attempt
        .as_mut()
        .ok_or_else(|| StepError::malformed("no pair-setup attempt in progress"))?;
    if current.owner() != conn {
        debug!(%conn, previous = %current.owner(), "pair-setup resumed on a new connection");
    }
    current.resume(conn, now);
    Ok(current)
}
