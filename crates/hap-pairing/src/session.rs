//! Per-connection pair-verify contexts.
//!
//! A context lives from pair-verify M1 until the connection closes. After a
//! successful M3 it also holds the transport keys for the connection.

use hap_crypto::keys::{EncryptionKey, SessionKeys, SharedSecret};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Identifier of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Pair-verify state for one connection.
#[derive(Clone)]
pub struct VerifyContext {
    pub(crate) accessory_public: [u8; 32],
    pub(crate) controller_public: [u8; 32],
    pub(crate) shared_secret: SharedSecret,
    pub(crate) session_key: EncryptionKey,
    pub(crate) transport_keys: Option<SessionKeys>,
}

impl VerifyContext {
    pub(crate) fn new(
        accessory_public: [u8; 32],
        controller_public: [u8; 32],
        shared_secret: SharedSecret,
        session_key: EncryptionKey,
    ) -> Self {
        Self {
            accessory_public,
            controller_public,
            shared_secret,
            session_key,
            transport_keys: None,
        }
    }

    /// Accessory ephemeral Curve25519 public key.
    pub fn accessory_public(&self) -> [u8; 32] {
        self.accessory_public
    }

    /// Controller ephemeral Curve25519 public key.
    pub fn controller_public(&self) -> [u8; 32] {
        self.controller_public
    }

    /// Whether M3 succeeded on this connection.
    pub fn is_verified(&self) -> bool {
        self.transport_keys.is_some()
    }

    /// Accessory-side transport keys, once verified.
    pub fn transport_keys(&self) -> Option<&SessionKeys> {
        self.transport_keys.as_ref()
    }
}

impl fmt::Debug for VerifyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyContext")
            .field("accessory_public", &hex::encode(self.accessory_public))
            .field("controller_public", &hex::encode(self.controller_public))
            .field("verified", &self.is_verified())
            .finish_non_exhaustive()
    }
}

/// Pair-verify contexts keyed by connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    contexts: Mutex<HashMap<ConnectionId, VerifyContext>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh context, returning the one it replaced.
    pub(crate) async fn insert(&self, conn: ConnectionId, context: VerifyContext) -> Option<VerifyContext> {
        self.contexts.lock().await.insert(conn, context)
    }

    /// Copy of the connection's context.
    pub async fn get(&self, conn: ConnectionId) -> Option<VerifyContext> {
        self.contexts.lock().await.get(&conn).cloned()
    }

    /// Record the transport keys after a successful M3.
    ///
    /// Returns false when the context vanished in the meantime.
    pub(crate) async fn complete(&self, conn: ConnectionId, keys: SessionKeys) -> bool {
        match self.contexts.lock().await.get_mut(&conn) {
            Some(context) => {
                context.transport_keys = Some(keys);
                true
            }
            None => false,
        }
    }

    /// Transport keys of a verified connection.
    pub async fn transport_keys(&self, conn: ConnectionId) -> Option<SessionKeys> {
        self.contexts
            .lock()
            .await
            .get(&conn)
            .and_then(|c| c.transport_keys.clone())
    }

    /// Destroy the connection's context. Returns whether one existed.
    pub async fn close(&self, conn: ConnectionId) -> bool {
        self.contexts.lock().await.remove(&conn).is_some()
    }

    pub async fn contains(&self, conn: ConnectionId) -> bool {
        self.contexts.lock().await.contains_key(&conn)
    }

    pub async fn len(&self) -> usize {
        self.contexts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
