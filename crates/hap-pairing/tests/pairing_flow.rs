//! End-to-end pair-setup and pair-verify between an accessory and a
//! controller, both driven through the public API.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hap_core::{AccessoryConfig, ErrorCode, PairingError, PairingRecord};
use hap_crypto::keys::SessionKeys;
use hap_crypto::{IdentityKeyPair, Tlv8, TlvType};
use hap_pairing::{
    ConnectionControl, ConnectionId, ControllerIdentity, ControllerPairSetup, ControllerPairVerify,
    EncryptedChannel, MemoryPairingStore, PairedAccessory, PairingServer, PairingStore,
    PAIRING_CONTENT_TYPE, PAIR_VERIFY_PATH,
};

const SETUP_CODE: &str = "031-45-154";
const DEVICE_ID: &str = "0E:1F:2A:3B:4C:5D";

/// Transport stand-in that records what the pairing engine asked of it.
#[derive(Default)]
struct RecordingConnections {
    encrypted: Mutex<Vec<(ConnectionId, SessionKeys)>>,
    kept_alive: Mutex<Vec<ConnectionId>>,
}

#[async_trait]
impl ConnectionControl for RecordingConnections {
    async fn mark_encrypted(&self, conn: ConnectionId, keys: SessionKeys) -> hap_core::Result<()> {
        self.encrypted.lock().unwrap().push((conn, keys));
        Ok(())
    }

    async fn keep_alive_forever(&self, conn: ConnectionId) -> hap_core::Result<()> {
        self.kept_alive.lock().unwrap().push(conn);
        Ok(())
    }
}

struct Harness {
    server: PairingServer,
    store: Arc<MemoryPairingStore>,
    connections: Arc<RecordingConnections>,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = AccessoryConfig::builder()
        .name("Hallway Sensor")
        .device_id(DEVICE_ID)
        .category(10)
        .setup_code(SETUP_CODE)
        .build()
        .unwrap();
    let store = Arc::new(MemoryPairingStore::new());
    let connections = Arc::new(RecordingConnections::default());
    let server = PairingServer::new(
        config,
        IdentityKeyPair::generate(),
        store.clone(),
        connections.clone(),
    );
    Harness {
        server,
        store,
        connections,
    }
}

fn error_of(body: &[u8]) -> (Option<u8>, Option<ErrorCode>) {
    let tlv = Tlv8::parse(body).unwrap();
    (tlv.state(), tlv.error())
}

async fn pair_setup(
    server: &PairingServer,
    conn: ConnectionId,
    identity: &ControllerIdentity,
) -> hap_core::Result<PairedAccessory> {
    let mut client = ControllerPairSetup::new(SETUP_CODE);

    let m2 = server.pair_setup(conn, &client.start()?).await;
    let m4 = server.pair_setup(conn, &client.process_m2(&m2)?).await;
    client.process_m4(&m4)?;
    let m6 = server.pair_setup(conn, &client.generate_m5(identity)?).await;
    client.process_m6(&m6)
}

async fn pair_verify(
    server: &PairingServer,
    conn: ConnectionId,
    identity: &ControllerIdentity,
    accessory_ltpk: [u8; 32],
) -> hap_core::Result<SessionKeys> {
    let mut client = ControllerPairVerify::new(identity, accessory_ltpk);

    let m2 = server.pair_verify(conn, &client.start()?).await;
    let m4 = server.pair_verify(conn, &client.process_m2(&m2)?).await;
    client.process_m4(&m4)
}

#[tokio::test]
async fn pair_setup_stores_admin_controller() {
    let h = harness();
    let controller = ControllerIdentity::generate();

    let accessory = pair_setup(&h.server, ConnectionId::next(), &controller)
        .await
        .unwrap();

    assert_eq!(accessory.identifier, DEVICE_ID);
    assert_eq!(accessory.public_key, h.server.accessory_public_key());

    let pairings = h.store.list_pairings().await;
    assert_eq!(
        pairings,
        vec![PairingRecord::new(controller.id_bytes(), controller.public_key(), true)]
    );
    assert!(h.store.is_paired().await);
    assert_eq!(h.store.status_flags(), 0);
    assert!(!h.server.device_state().has_attempt().await);
}

#[tokio::test]
async fn wrong_setup_code_is_rejected() {
    let h = harness();
    let mut client = ControllerPairSetup::new("999-88-777");
    let conn = ConnectionId::next();

    let m2 = h.server.pair_setup(conn, &client.start().unwrap()).await;
    let response = h.server.pair_setup(conn, &client.process_m2(&m2).unwrap()).await;

    assert_eq!(error_of(&response), (Some(0x03), Some(ErrorCode::Authentication)));
    assert!(matches!(
        client.process_m4(&response),
        Err(hap_core::Error::Pairing(PairingError::Rejected(ErrorCode::Authentication)))
    ));
    assert_eq!(h.server.device_state().failed_auth_count(), 1);
    assert!(!h.server.device_state().has_attempt().await);
}

#[tokio::test]
async fn paired_accessory_refuses_pair_setup() {
    let h = harness();
    pair_setup(&h.server, ConnectionId::next(), &ControllerIdentity::generate())
        .await
        .unwrap();

    let response = h
        .server
        .pair_setup(ConnectionId::next(), &Tlv8::pair_setup_m1().encode())
        .await;
    assert_eq!(error_of(&response), (Some(0x01), Some(ErrorCode::Unavailable)));
}

#[tokio::test]
async fn removing_last_admin_reopens_pair_setup() {
    let h = harness();
    let controller = ControllerIdentity::generate();
    pair_setup(&h.server, ConnectionId::next(), &controller)
        .await
        .unwrap();

    h.store.remove_pairing(controller.id().as_bytes()).await.unwrap();

    let response = h
        .server
        .pair_setup(ConnectionId::next(), &Tlv8::pair_setup_m1().encode())
        .await;
    assert_eq!(Tlv8::parse(&response).unwrap().state(), Some(0x02));
}

#[tokio::test]
async fn concurrent_attempt_is_busy_until_stale() {
    let h = harness();
    let first = ConnectionId::next();
    let second = ConnectionId::next();
    let m1 = Tlv8::pair_setup_m1().encode();
    let start = Instant::now();

    let response = h.server.pair_setup_at(first, &m1, start).await;
    assert_eq!(Tlv8::parse(&response).unwrap().state(), Some(0x02));

    let response = h
        .server
        .pair_setup_at(second, &m1, start + Duration::from_secs(10))
        .await;
    assert_eq!(error_of(&response), (Some(0x01), Some(ErrorCode::Busy)));

    let response = h
        .server
        .pair_setup_at(second, &m1, start + Duration::from_secs(31))
        .await;
    assert_eq!(Tlv8::parse(&response).unwrap().state(), Some(0x02));
    assert_eq!(h.server.device_state().attempt_owner().await, Some(second));
}

#[tokio::test]
async fn pair_setup_resumes_after_reconnect() {
    let h = harness();
    let controller = ControllerIdentity::generate();
    let mut client = ControllerPairSetup::new(SETUP_CODE);

    let m2 = h.server.pair_setup(ConnectionId::next(), &client.start().unwrap()).await;
    let m4 = h
        .server
        .pair_setup(ConnectionId::next(), &client.process_m2(&m2).unwrap())
        .await;
    client.process_m4(&m4).unwrap();
    let m6 = h
        .server
        .pair_setup(ConnectionId::next(), &client.generate_m5(&controller).unwrap())
        .await;
    let accessory = client.process_m6(&m6).unwrap();

    assert_eq!(accessory.public_key, h.server.accessory_public_key());
    assert!(h.store.get_pairing(&controller.id_bytes()).await.is_some());
}

#[tokio::test]
async fn malformed_step_frees_the_device() {
    let h = harness();
    let first = ConnectionId::next();
    h.server.pair_setup(first, &Tlv8::pair_setup_m1().encode()).await;

    let no_proof = Tlv8::new()
        .with(TlvType::State, [0x03])
        .with(TlvType::PublicKey, vec![0x02; 384])
        .encode();
    let response = h.server.pair_setup(first, &no_proof).await;
    assert_eq!(error_of(&response), (Some(0x03), Some(ErrorCode::Unknown)));

    let response = h
        .server
        .pair_setup(ConnectionId::next(), &Tlv8::pair_setup_m1().encode())
        .await;
    assert_eq!(Tlv8::parse(&response).unwrap().state(), Some(0x02));
}

#[tokio::test]
async fn zero_srp_public_key_is_authentication() {
    let h = harness();
    let conn = ConnectionId::next();
    h.server
        .pair_setup(conn, &Tlv8::pair_setup_m1().encode())
        .await;

    let m3 = Tlv8::new()
        .with(TlvType::State, [0x03])
        .with(TlvType::PublicKey, vec![0x00; 384])
        .with(TlvType::Proof, vec![0x00; 64])
        .encode();
    let response = h.server.pair_setup(conn, &m3).await;

    assert_eq!(error_of(&response), (Some(0x03), Some(ErrorCode::Authentication)));
    assert!(!h.server.device_state().has_attempt().await);
}

#[tokio::test]
async fn too_many_failures_lock_out_pair_setup() {
    let h = harness();
    let stranger = ControllerIdentity::generate();
    let accessory_ltpk = h.server.accessory_public_key();

    for _ in 0..100 {
        let result = pair_verify(&h.server, ConnectionId::next(), &stranger, accessory_ltpk).await;
        assert!(result.is_err());
    }
    assert_eq!(h.server.device_state().failed_auth_count(), 100);

    // At the ceiling pair-setup is still open.
    let response = h
        .server
        .pair_setup(ConnectionId::next(), &Tlv8::pair_setup_m1().encode())
        .await;
    assert_eq!(Tlv8::parse(&response).unwrap().state(), Some(0x02));

    let result = pair_verify(&h.server, ConnectionId::next(), &stranger, accessory_ltpk).await;
    assert!(result.is_err());
    assert_eq!(h.server.device_state().failed_auth_count(), 101);

    let response = h
        .server
        .pair_setup(ConnectionId::next(), &Tlv8::pair_setup_m1().encode())
        .await;
    assert_eq!(error_of(&response), (Some(0x01), Some(ErrorCode::MaxTries)));
}

#[tokio::test]
async fn pair_verify_opens_encrypted_channel() {
    let h = harness();
    let controller = ControllerIdentity::generate();
    let accessory = pair_setup(&h.server, ConnectionId::next(), &controller)
        .await
        .unwrap();

    let conn = ConnectionId::next();
    let controller_keys = pair_verify(&h.server, conn, &controller, accessory.public_key)
        .await
        .unwrap();

    let accessory_keys = h.server.sessions().transport_keys(conn).await.unwrap();
    assert_ne!(accessory_keys.read_key.as_bytes(), accessory_keys.write_key.as_bytes());
    assert_eq!(accessory_keys.write_key.as_bytes(), controller_keys.read_key.as_bytes());

    {
        let encrypted = h.connections.encrypted.lock().unwrap();
        assert_eq!(encrypted.len(), 1);
        assert_eq!(encrypted[0].0, conn);
        assert_eq!(encrypted[0].1.write_key.as_bytes(), accessory_keys.write_key.as_bytes());
    }
    assert_eq!(*h.connections.kept_alive.lock().unwrap(), vec![conn]);

    let mut accessory_channel = h.server.open_channel(conn).await.unwrap();
    let mut controller_channel = EncryptedChannel::new(&controller_keys);

    let request = controller_channel.encrypt(b"GET /accessories HTTP/1.1\r\n\r\n").unwrap();
    assert_eq!(
        accessory_channel.decrypt(&request).unwrap(),
        b"GET /accessories HTTP/1.1\r\n\r\n"
    );
    let response = accessory_channel.encrypt(b"HTTP/1.1 200 OK\r\n\r\n").unwrap();
    assert_eq!(
        controller_channel.decrypt(&response).unwrap(),
        b"HTTP/1.1 200 OK\r\n\r\n"
    );

    h.server.connection_closed(conn).await;
    assert!(h.server.open_channel(conn).await.is_none());
}

#[tokio::test]
async fn pair_verify_rejects_unknown_controller() {
    let h = harness();
    pair_setup(&h.server, ConnectionId::next(), &ControllerIdentity::generate())
        .await
        .unwrap();

    let stranger = ControllerIdentity::generate();
    let mut client = ControllerPairVerify::new(&stranger, h.server.accessory_public_key());
    let conn = ConnectionId::next();

    let m2 = h.server.pair_verify(conn, &client.start().unwrap()).await;
    let response = h.server.pair_verify(conn, &client.process_m2(&m2).unwrap()).await;

    assert_eq!(error_of(&response), (Some(0x03), Some(ErrorCode::Authentication)));
    assert!(h.connections.encrypted.lock().unwrap().is_empty());
    assert!(h.server.open_channel(conn).await.is_none());
}

#[tokio::test]
async fn pair_verify_m3_without_m1_is_unknown() {
    let h = harness();
    let body = Tlv8::new()
        .with(TlvType::State, [0x03])
        .with(TlvType::EncryptedData, vec![0xAB; 96])
        .encode();

    let response = h
        .server
        .handle(PAIR_VERIFY_PATH, Some(PAIRING_CONTENT_TYPE), ConnectionId::next(), &body)
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(error_of(&response.body), (Some(0x03), Some(ErrorCode::Unknown)));
}

#[tokio::test]
async fn controller_detects_impostor_accessory() {
    let h = harness();
    let controller = ControllerIdentity::generate();
    pair_setup(&h.server, ConnectionId::next(), &controller)
        .await
        .unwrap();

    let wrong_ltpk = IdentityKeyPair::generate().public_key();
    let result = pair_verify(&h.server, ConnectionId::next(), &controller, wrong_ltpk).await;

    assert!(matches!(
        result,
        Err(hap_core::Error::Pairing(PairingError::SignatureInvalid))
    ));
}
