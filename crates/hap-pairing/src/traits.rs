//! Boundaries to the transport and the pairing registry.

use crate::session::ConnectionId;
use hap_core::device::PairingRecord;
use hap_core::error::Result;
use hap_crypto::keys::SessionKeys;
use async_trait::async_trait;

/// Control over the connection a pairing request arrived on.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionControl: Send + Sync {
    /// Switch the connection to encrypted framing with the accessory-side keys.
    ///
    /// The response to the current request is still sent in plaintext.
    async fn mark_encrypted(&self, conn: ConnectionId, keys: SessionKeys) -> Result<()>;

    /// Exempt the connection from idle timeouts.
    async fn keep_alive_forever(&self, conn: ConnectionId) -> Result<()>;
}

/// Persistent registry of paired controllers.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PairingStore: Send + Sync {
    /// Add a pairing. Fails with `DuplicatePairing` if the identifier exists.
    async fn add_pairing(&self, record: PairingRecord) -> Result<()>;

    async fn get_pairing(&self, identifier: &[u8]) -> Option<PairingRecord>;

    /// Remove a pairing. Fails with `UnknownController` if it does not exist.
    async fn remove_pairing(&self, identifier: &[u8]) -> Result<PairingRecord>;

    async fn list_pairings(&self) -> Vec<PairingRecord>;

    /// Whether an admin controller is paired, closing pair-setup.
    async fn is_paired(&self) -> bool;
}
