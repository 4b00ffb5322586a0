//! Controller side of pair-setup and pair-verify.
//!
//! Drives the accessory handshakes from the iOS-device end. Used by the demo
//! binary and by the tests to exercise the accessory against a real peer.

use crate::pair_setup::{PS_MSG05_NONCE, PS_MSG06_NONCE};
use crate::pair_verify::{signed_message, PV_MSG02_NONCE, PV_MSG03_NONCE};
use hap_core::error::{CryptoError, Error, PairingError, ParseError, Result};
use hap_crypto::{
    chacha,
    curve25519::{self, EcdhKeyPair},
    ed25519::{self, IdentityKeyPair},
    hkdf,
    keys::{SessionKeys, SharedSecret},
    srp::{SrpChallenge, SrpClient, SALT_LEN, SRP_USERNAME},
    tlv::{Tlv8, TlvType},
};
use std::path::Path;
use tracing::debug;

/// Long-term identity of a controller.
///
/// The identifier is what the accessory stores in its pairing record, so the
/// same value must be sent in pair-setup M5 and every pair-verify M3.
#[derive(Clone)]
pub struct ControllerIdentity {
    id: String,
    keypair: IdentityKeyPair,
}

impl ControllerIdentity {
    pub fn generate() -> Self {
        Self::from_keypair(IdentityKeyPair::generate())
    }

    /// Identity with a UUID-shaped identifier taken from the public key.
    pub fn from_keypair(keypair: IdentityKeyPair) -> Self {
        let pk = hex::encode_upper(&keypair.public_key()[..16]);
        let id = format!(
            "{}-{}-{}-{}-{}",
            &pk[0..8],
            &pk[8..12],
            &pk[12..16],
            &pk[16..20],
            &pk[20..32]
        );
        Self { id, keypair }
    }

    pub fn with_id(keypair: IdentityKeyPair, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keypair,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn id_bytes(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }

    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    /// Ed25519 long-term public key (LTPK).
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }

    /// Load an identity saved by [`save`](Self::save).
    ///
    /// File format: line 1 = identifier, line 2 = hex-encoded Ed25519 seed.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut lines = contents.lines();

        let id = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| invalid_data("missing identifier"))?
            .to_string();
        let seed_hex = lines.next().ok_or_else(|| invalid_data("missing seed"))?;

        let seed: [u8; 32] = hex::decode(seed_hex.trim())
            .map_err(|e| invalid_data(format!("invalid seed hex: {}", e)))?
            .try_into()
            .map_err(|bytes: Vec<u8>| {
                invalid_data(format!("seed must be 32 bytes, got {}", bytes.len()))
            })?;

        Ok(Self {
            id,
            keypair: IdentityKeyPair::from_seed(&seed),
        })
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let contents = format!("{}\n{}\n", self.id, hex::encode(self.keypair.seed()));
        std::fs::write(path, contents)
    }

    /// Load the identity at `path`, or create and save a new one.
    pub fn load_or_generate(path: &Path) -> std::io::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let identity = Self::generate();
            identity.save(path)?;
            Ok(identity)
        }
    }
}

impl std::fmt::Debug for ControllerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerIdentity")
            .field("id", &self.id)
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

fn invalid_data(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

/// Parse an accessory response, surfacing its error TLV and checking the state.
fn expect_state(data: &[u8], expected: u8) -> Result<Tlv8> {
    let tlv = Tlv8::parse(data)?;
    if let Some(code) = tlv.error() {
        return Err(PairingError::Rejected(code).into());
    }
    let actual = tlv.state().unwrap_or(0);
    if actual != expected {
        return Err(PairingError::StateMismatch { expected, actual }.into());
    }
    Ok(tlv)
}

fn missing(what: &str) -> Error {
    PairingError::InvalidState(format!("{} called out of order", what)).into()
}

/// An accessory learned through pair-setup M6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedAccessory {
    /// Accessory pairing identifier (its device id string).
    pub identifier: String,
    /// Accessory Ed25519 long-term public key.
    pub public_key: [u8; 32],
}

/// Controller half of pair-setup.
///
/// Call order: [`start`](Self::start), [`process_m2`](Self::process_m2),
/// [`process_m4`](Self::process_m4), [`generate_m5`](Self::generate_m5),
/// [`process_m6`](Self::process_m6).
pub struct ControllerPairSetup {
    setup_code: String,
    srp: Option<SrpClient>,
    shared_secret: Option<SharedSecret>,
    expected_server_proof: Option<Vec<u8>>,
    server_verified: bool,
}

impl ControllerPairSetup {
    pub fn new(setup_code: impl Into<String>) -> Self {
        Self {
            setup_code: setup_code.into(),
            srp: None,
            shared_secret: None,
            expected_server_proof: None,
            server_verified: false,
        }
    }

    /// M1: state 1, method pair-setup.
    pub fn start(&mut self) -> Result<Vec<u8>> {
        self.srp = Some(SrpClient::new(SRP_USERNAME, self.setup_code.as_bytes()));
        self.shared_secret = None;
        self.expected_server_proof = None;
        self.server_verified = false;
        Ok(Tlv8::pair_setup_m1().encode())
    }

    /// M2 -> M3: answer the SRP challenge.
    pub fn process_m2(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let m2 = expect_state(data, 0x02)?;
        let srp = self.srp.as_ref().ok_or_else(|| missing("process_m2"))?;

        let salt: [u8; SALT_LEN] = m2
            .require(TlvType::Salt)?
            .try_into()
            .map_err(|_| ParseError::InvalidValue("salt must be 16 bytes".to_string()))?;
        let challenge = SrpChallenge {
            salt,
            server_public_key: m2.require(TlvType::PublicKey)?.to_vec(),
        };

        let proof = srp.process_challenge(&challenge)?;
        let m3 = Tlv8::new()
            .with(TlvType::State, [0x03])
            .with(TlvType::PublicKey, srp.public_key())
            .with(TlvType::Proof, proof.client_proof.clone());

        self.shared_secret = Some(proof.shared_secret.clone());
        self.expected_server_proof = Some(proof.expected_server_proof.clone());
        debug!("pair-setup M2 processed, sending M3");
        Ok(m3.encode())
    }

    /// M4: check the accessory's SRP proof.
    pub fn process_m4(&mut self, data: &[u8]) -> Result<()> {
        let m4 = expect_state(data, 0x04)?;
        let srp = self.srp.as_ref().ok_or_else(|| missing("process_m4"))?;
        let expected = self
            .expected_server_proof
            .as_deref()
            .ok_or_else(|| missing("process_m4"))?;

        if !srp.verify_server_proof(m4.require(TlvType::Proof)?, expected) {
            return Err(PairingError::SrpVerificationFailed.into());
        }
        self.server_verified = true;
        Ok(())
    }

    /// M5: send our long-term key, signed and encrypted.
    pub fn generate_m5(&self, identity: &ControllerIdentity) -> Result<Vec<u8>> {
        if !self.server_verified {
            return Err(missing("generate_m5"));
        }
        let shared = self.shared_secret.as_ref().ok_or_else(|| missing("generate_m5"))?;

        let controller_x = hkdf::derive_controller_sign_key(shared.as_bytes())?;
        let ltpk = identity.public_key();
        let info = signed_message(&controller_x, identity.id().as_bytes(), &ltpk);

        let sub_tlv = Tlv8::new()
            .with(TlvType::Identifier, identity.id_bytes())
            .with(TlvType::PublicKey, ltpk.to_vec())
            .with(TlvType::Signature, identity.sign(&info).to_vec());

        let key = SessionKeys::derive_pair_setup_key(shared)?;
        let encrypted = chacha::encrypt(key.as_bytes(), PS_MSG05_NONCE, &sub_tlv.encode())?;

        Ok(Tlv8::new()
            .with(TlvType::State, [0x05])
            .with(TlvType::EncryptedData, encrypted)
            .encode())
    }

    /// M6: decrypt and verify the accessory's long-term key.
    pub fn process_m6(&self, data: &[u8]) -> Result<PairedAccessory> {
        let m6 = expect_state(data, 0x06)?;
        let shared = self.shared_secret.as_ref().ok_or_else(|| missing("process_m6"))?;

        let key = SessionKeys::derive_pair_setup_key(shared)?;
        let plaintext =
            chacha::decrypt_sealed(key.as_bytes(), PS_MSG06_NONCE, m6.require(TlvType::EncryptedData)?)?;
        let info = Tlv8::parse(&plaintext)?;

        let identifier = info.require(TlvType::Identifier)?;
        let ltpk = info.require(TlvType::PublicKey)?;
        let accessory_x = hkdf::derive_accessory_sign_key(shared.as_bytes())?;
        let message = signed_message(&accessory_x, identifier, ltpk);
        ed25519::verify_slice(ltpk, &message, info.require(TlvType::Signature)?)
            .map_err(|_| PairingError::SignatureInvalid)?;

        Ok(PairedAccessory {
            identifier: String::from_utf8_lossy(identifier).into_owned(),
            public_key: ltpk.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: ltpk.len(),
            })?,
        })
    }
}

/// Controller half of pair-verify against an accessory paired earlier.
pub struct ControllerPairVerify {
    identity: ControllerIdentity,
    accessory_ltpk: [u8; 32],
    ecdh: Option<EcdhKeyPair>,
    controller_public: Option<[u8; 32]>,
    shared_secret: Option<SharedSecret>,
}

impl ControllerPairVerify {
    pub fn new(identity: &ControllerIdentity, accessory_ltpk: [u8; 32]) -> Self {
        Self {
            identity: identity.clone(),
            accessory_ltpk,
            ecdh: None,
            controller_public: None,
            shared_secret: None,
        }
    }

    /// M1: state 1 with a fresh ephemeral key.
    pub fn start(&mut self) -> Result<Vec<u8>> {
        let ecdh = EcdhKeyPair::generate();
        let public = ecdh.public_key();
        self.ecdh = Some(ecdh);
        self.controller_public = Some(public);
        self.shared_secret = None;
        Ok(Tlv8::pair_verify_m1(&public).encode())
    }

    /// M2 -> M3: authenticate the accessory and sign our side of the transcript.
    pub fn process_m2(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let m2 = expect_state(data, 0x02)?;
        let ecdh = self.ecdh.take().ok_or_else(|| missing("process_m2"))?;
        let controller_public = self.controller_public.ok_or_else(|| missing("process_m2"))?;

        let accessory_public = curve25519::peer_key(m2.require(TlvType::PublicKey)?)?;
        let shared = SharedSecret::new(ecdh.diffie_hellman(&accessory_public)?.to_vec());
        let key = SessionKeys::derive_pair_verify_key(&shared)?;

        let plaintext =
            chacha::decrypt_sealed(key.as_bytes(), PV_MSG02_NONCE, m2.require(TlvType::EncryptedData)?)?;
        let info = Tlv8::parse(&plaintext)?;
        let accessory_id = info.require(TlvType::Identifier)?;

        let message = signed_message(&accessory_public, accessory_id, &controller_public);
        ed25519::verify_slice(&self.accessory_ltpk, &message, info.require(TlvType::Signature)?)
            .map_err(|_| PairingError::SignatureInvalid)?;

        let ours = signed_message(&controller_public, self.identity.id().as_bytes(), &accessory_public);
        let sub_tlv = Tlv8::new()
            .with(TlvType::Identifier, self.identity.id_bytes())
            .with(TlvType::Signature, self.identity.sign(&ours).to_vec());
        let encrypted = chacha::encrypt(key.as_bytes(), PV_MSG03_NONCE, &sub_tlv.encode())?;

        self.shared_secret = Some(shared);
        debug!(accessory = %String::from_utf8_lossy(accessory_id), "pair-verify M2 verified, sending M3");
        Ok(Tlv8::new()
            .with(TlvType::State, [0x03])
            .with(TlvType::EncryptedData, encrypted)
            .encode())
    }

    /// M4: the controller's transport keys.
    pub fn process_m4(&self, data: &[u8]) -> Result<SessionKeys> {
        expect_state(data, 0x04)?;
        let shared = self.shared_secret.as_ref().ok_or_else(|| missing("process_m4"))?;
        Ok(SessionKeys::derive_controller_keys(shared)?)
    }
}
