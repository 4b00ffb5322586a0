//! HomeKit accessory pairing demo.
//!
//! Runs a controller through pair-setup and pair-verify against an in-process
//! accessory, then exchanges one request over the encrypted channel.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hap_core::AccessoryConfig;
use hap_crypto::keys::SessionKeys;
use hap_crypto::IdentityKeyPair;
use hap_pairing::{
    ConnectionControl, ConnectionId, ControllerIdentity, ControllerPairSetup, ControllerPairVerify,
    EncryptedChannel, MemoryPairingStore, PairingServer, PairingStore, PAIRING_CONTENT_TYPE,
    PAIR_SETUP_PATH, PAIR_VERIFY_PATH,
};
use tracing::{debug, info};

/// Command-line arguments
struct Args {
    setup_code: String,
    device_id: String,
    name: String,
    /// Controller identity file, created if missing
    controller_file: Option<PathBuf>,
    debug: bool,
    /// Write logs here instead of stderr
    log_file: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            setup_code: "031-45-154".to_string(),
            device_id: "0E:1F:2A:3B:4C:5D".to_string(),
            name: "Demo Accessory".to_string(),
            controller_file: None,
            debug: false,
            log_file: None,
        }
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--setup-code" | "-c" => {
                if let Some(code) = iter.next() {
                    args.setup_code = code;
                }
            }
            "--device-id" | "-i" => {
                if let Some(id) = iter.next() {
                    args.device_id = id;
                }
            }
            "--name" | "-n" => {
                if let Some(name) = iter.next() {
                    args.name = name;
                }
            }
            "--controller-file" => {
                if let Some(path) = iter.next() {
                    args.controller_file = Some(PathBuf::from(path));
                }
            }
            "--debug" | "-d" => {
                args.debug = true;
            }
            "--log-file" | "-l" => {
                if let Some(path) = iter.next() {
                    args.log_file = Some(PathBuf::from(path));
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    args
}

fn print_help() {
    println!("hap-accessory - HomeKit accessory pairing demo");
    println!();
    println!("Usage: hap-accessory [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --setup-code CODE     Accessory setup code (default: 031-45-154)");
    println!("  -i, --device-id MAC       Accessory device id (default: 0E:1F:2A:3B:4C:5D)");
    println!("  -n, --name NAME           Accessory name (default: Demo Accessory)");
    println!("      --controller-file P   Load or create the controller identity at P");
    println!("  -d, --debug               Enable debug logging");
    println!("  -l, --log-file PATH       Write logs to PATH instead of stderr");
    println!("  -h, --help                Show this help message");
}

fn setup_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let Some(path) = &args.log_file else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_max_level(level)
            .init();
        return Ok(None);
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating log file {}", path.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_max_level(level)
        .init();

    info!("Logging to {:?}", path);
    Ok(Some(guard))
}

/// In-process stand-in for the accessory's TCP transport.
struct DemoTransport;

#[async_trait]
impl ConnectionControl for DemoTransport {
    async fn mark_encrypted(&self, conn: ConnectionId, _keys: SessionKeys) -> hap_core::Result<()> {
        info!(%conn, "transport switched to encrypted framing");
        Ok(())
    }

    async fn keep_alive_forever(&self, conn: ConnectionId) -> hap_core::Result<()> {
        debug!(%conn, "idle timeout disabled");
        Ok(())
    }
}

/// POST a TLV body to the accessory as the transport would.
async fn post(server: &PairingServer, path: &str, conn: ConnectionId, body: &[u8]) -> Result<Vec<u8>> {
    let response = server
        .handle(path, Some(PAIRING_CONTENT_TYPE), conn, body)
        .await;
    if response.status != 200 {
        bail!("{} returned HTTP {}", path, response.status);
    }
    Ok(response.body)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    let _guard = setup_logging(&args)?;

    let config = AccessoryConfig::builder()
        .name(args.name.as_str())
        .device_id(args.device_id.as_str())
        .setup_code(args.setup_code.as_str())
        .build()
        .context("invalid accessory configuration")?;
    info!(name = %config.name, device_id = %config.device_id, "starting accessory");

    let store = Arc::new(MemoryPairingStore::new());
    let server = PairingServer::new(
        config,
        IdentityKeyPair::generate(),
        store.clone(),
        Arc::new(DemoTransport),
    );

    let controller = match &args.controller_file {
        Some(path) => ControllerIdentity::load_or_generate(path)
            .with_context(|| format!("controller identity at {}", path.display()))?,
        None => ControllerIdentity::generate(),
    };
    info!(controller = controller.id(), "controller identity ready");

    // Pair-setup on the first connection.
    let conn = ConnectionId::next();
    let mut setup = ControllerPairSetup::new(args.setup_code.as_str());
    let m2 = post(&server, PAIR_SETUP_PATH, conn, &setup.start()?).await?;
    let m4 = post(&server, PAIR_SETUP_PATH, conn, &setup.process_m2(&m2)?).await?;
    setup.process_m4(&m4)?;
    let m6 = post(&server, PAIR_SETUP_PATH, conn, &setup.generate_m5(&controller)?).await?;
    let accessory = setup.process_m6(&m6)?;
    server.connection_closed(conn).await;
    info!(accessory = %accessory.identifier, "paired with accessory");

    for record in store.list_pairings().await {
        info!(controller = %record.identifier_lossy(), admin = record.is_admin, "stored pairing");
    }

    // Pair-verify on a fresh connection, then talk over the encrypted channel.
    let conn = ConnectionId::next();
    let mut verify = ControllerPairVerify::new(&controller, accessory.public_key);
    let m2 = post(&server, PAIR_VERIFY_PATH, conn, &verify.start()?).await?;
    let m4 = post(&server, PAIR_VERIFY_PATH, conn, &verify.process_m2(&m2)?).await?;
    let controller_keys = verify.process_m4(&m4)?;

    let mut accessory_channel = server
        .open_channel(conn)
        .await
        .context("accessory has no transport keys after pair-verify")?;
    let mut controller_channel = EncryptedChannel::new(&controller_keys);

    let request = controller_channel.encrypt(b"GET /accessories HTTP/1.1\r\n\r\n")?;
    let received = accessory_channel.decrypt(&request)?;
    info!(
        bytes = request.len(),
        request = %String::from_utf8_lossy(&received).trim_end(),
        "accessory decrypted controller request"
    );

    server.connection_closed(conn).await;
    info!("demo complete");
    Ok(())
}
