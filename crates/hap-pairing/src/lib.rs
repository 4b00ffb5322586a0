//! # hap-pairing
//!
//! Accessory side of HomeKit pairing.
//!
//! This crate implements:
//! - Pair-setup M1-M6 (SRP-6a, long-term key exchange)
//! - Pair-verify M1-M4 (Curve25519 + Ed25519 station-to-station)
//! - The encrypted channel used once a connection is verified
//! - A controller-side client for driving both handshakes
//!
//! The transport and the persistent pairing registry stay outside the crate,
//! behind [`ConnectionControl`] and [`PairingStore`].

mod channel;
mod controller;
mod pair_setup;
mod pair_verify;
mod server;
mod session;
mod state;
mod step;
mod store;
mod traits;

pub use channel::EncryptedChannel;
pub use controller::{ControllerIdentity, ControllerPairSetup, ControllerPairVerify, PairedAccessory};
pub use server::{PairingResponse, PairingServer, PAIRING_CONTENT_TYPE, PAIR_SETUP_PATH, PAIR_VERIFY_PATH};
pub use session::{ConnectionId, SessionRegistry, VerifyContext};
pub use state::{DeviceState, SetupAttempt};
pub use store::{MemoryPairingStore, STATUS_FLAG_UNPAIRED};
pub use traits::{ConnectionControl, PairingStore};
