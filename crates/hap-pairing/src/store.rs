//! In-memory pairing registry.

use crate::traits::PairingStore;
use async_trait::async_trait;
use hap_core::device::PairingRecord;
use hap_core::error::{PairingError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Status flag bit advertised while no admin controller is paired.
pub const STATUS_FLAG_UNPAIRED: u8 = 0x01;

/// Pairing registry kept in process memory.
///
/// Also tracks the advertised status flags: adding an admin clears
/// [`STATUS_FLAG_UNPAIRED`], removing the last admin sets it again.
#[derive(Debug)]
pub struct MemoryPairingStore {
    pairings: RwLock<HashMap<Vec<u8>, PairingRecord>>,
    status_flags: AtomicU8,
}

impl Default for MemoryPairingStore {
    fn default() -> Self {
        Self {
            pairings: RwLock::new(HashMap::new()),
            status_flags: AtomicU8::new(STATUS_FLAG_UNPAIRED),
        }
    }
}

impl MemoryPairingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing pairings, as loaded from persistent configuration.
    pub fn with_pairings(records: impl IntoIterator<Item = PairingRecord>) -> Self {
        let pairings: HashMap<_, _> = records
            .into_iter()
            .map(|r| (r.identifier.clone(), r))
            .collect();
        let flags = if has_admin(&pairings) { 0 } else { STATUS_FLAG_UNPAIRED };
        Self {
            pairings: RwLock::new(pairings),
            status_flags: AtomicU8::new(flags),
        }
    }

    /// Current status flags for service advertisement.
    pub fn status_flags(&self) -> u8 {
        self.status_flags.load(Ordering::SeqCst)
    }
}

fn has_admin(pairings: &HashMap<Vec<u8>, PairingRecord>) -> bool {
    pairings.values().any(|r| r.is_admin)
}

#[async_trait]
impl PairingStore for MemoryPairingStore {
    async fn add_pairing(&self, record: PairingRecord) -> Result<()> {
        let mut pairings = self.pairings.write().await;
        if pairings.contains_key(&record.identifier) {
            return Err(PairingError::DuplicatePairing(record.identifier_lossy()).into());
        }

        if record.is_admin {
            self.status_flags.fetch_and(!STATUS_FLAG_UNPAIRED, Ordering::SeqCst);
        }
        info!(
            controller = %record.identifier_lossy(),
            admin = record.is_admin,
            "pairing added"
        );
        pairings.insert(record.identifier.clone(), record);
        Ok(())
    }

    async fn get_pairing(&self, identifier: &[u8]) -> Option<PairingRecord> {
        self.pairings.read().await.get(identifier).cloned()
    }

    async fn remove_pairing(&self, identifier: &[u8]) -> Result<PairingRecord> {
        let mut pairings = self.pairings.write().await;
        let record = pairings.remove(identifier).ok_or_else(|| {
            PairingError::UnknownController(String::from_utf8_lossy(identifier).into_owned())
        })?;

        if !has_admin(&pairings) {
            self.status_flags.fetch_or(STATUS_FLAG_UNPAIRED, Ordering::SeqCst);
            debug!("last admin removed, pair-setup re-enabled");
        }
        info!(controller = %record.identifier_lossy(), "pairing removed");
        Ok(record)
    }

    async fn list_pairings(&self) -> Vec<PairingRecord> {
        let mut records: Vec<_> = self.pairings.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        records
    }

    async fn is_paired(&self) -> bool {
        self.status_flags() & STATUS_FLAG_UNPAIRED == 0
    }
}
