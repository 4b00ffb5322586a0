//! Device-wide pairing state shared by all connections.

use crate::session::ConnectionId;
use hap_crypto::srp::SrpServer;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};

/// The one pair-setup exchange the device is currently running.
pub struct SetupAttempt {
    owner: ConnectionId,
    last_step: Instant,
    srp: SrpServer,
}

impl SetupAttempt {
    pub(crate) fn new(owner: ConnectionId, srp: SrpServer, now: Instant) -> Self {
        Self {
            owner,
            last_step: now,
            srp,
        }
    }

    /// Connection that sent the most recent step.
    pub fn owner(&self) -> ConnectionId {
        self.owner
    }

    /// Time of the most recent step.
    pub fn last_step(&self) -> Instant {
        self.last_step
    }

    /// Whether the attempt has been idle for at least `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_step) >= timeout
    }

    /// Continue the attempt from `conn`, which may differ from the
    /// connection that sent M1.
    pub(crate) fn resume(&mut self, conn: ConnectionId, now: Instant) {
        self.owner = conn;
        self.last_step = now;
    }

    pub(crate) fn srp(&self) -> &SrpServer {
        &self.srp
    }

    pub(crate) fn srp_mut(&mut self) -> &mut SrpServer {
        &mut self.srp
    }
}

impl fmt::Debug for SetupAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupAttempt")
            .field("owner", &self.owner)
            .field("last_step", &self.last_step)
            .finish_non_exhaustive()
    }
}

/// Counters and the in-flight pair-setup attempt for one accessory.
///
/// The attempt mutex is held for a whole pair-setup step, so the busy check
/// and the replacement of a stale attempt happen atomically.
#[derive(Debug, Default)]
pub struct DeviceState {
    failed_auth: AtomicU32,
    attempt: Mutex<Option<SetupAttempt>>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failed authentications since startup.
    pub fn failed_auth_count(&self) -> u32 {
        self.failed_auth.load(Ordering::SeqCst)
    }

    /// Count one failed authentication, returning the new total.
    pub(crate) fn record_failed_auth(&self) -> u32 {
        self.failed_auth.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    pub(crate) async fn attempt(&self) -> MutexGuard<'_, Option<SetupAttempt>> {
        self.attempt.lock().await
    }

    /// Owner of the in-flight attempt, if any.
    pub async fn attempt_owner(&self) -> Option<ConnectionId> {
        self.attempt.lock().await.as_ref().map(SetupAttempt::owner)
    }

    pub async fn has_attempt(&self) -> bool {
        self.attempt.lock().await.is_some()
    }
}
