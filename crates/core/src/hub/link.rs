//! A registered peer link.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chordmesh_transport::core::transport::ConnectionInterface;
use chordmesh_transport::core::transport::ConnectionState;
use chordmesh_transport::Connection;

use crate::utils::get_epoch_ms;

/// Connection to one remote node, with its activity bookkeeping.
pub struct Link {
    conn: Arc<Connection>,
    created: u64,
    last_active: AtomicU64,
}

impl Link {
    pub(crate) fn new(conn: Arc<Connection>) -> Self {
        let now = get_epoch_ms();
        Self {
            conn,
            created: now,
            last_active: AtomicU64::new(now),
        }
    }

    /// The underlying connection.
    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Id of the underlying connection.
    pub fn id(&self) -> &str {
        self.conn.id()
    }

    /// State of the underlying connection.
    pub fn state(&self) -> ConnectionState {
        self.conn.connection_state()
    }

    /// Registration time, epoch ms.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Last time something was sent or received, epoch ms.
    pub fn last_active(&self) -> u64 {
        self.last_active.load(Ordering::Relaxed)
    }

    /// Mark the link active now.
    pub fn touch(&self) {
        self.last_active.store(get_epoch_ms(), Ordering::Relaxed)
    }

    /// Whether the link stayed idle for at least `timeout` ms.
    pub fn is_idle(&self, now: u64, timeout: u64) -> bool {
        now.saturating_sub(self.last_active()) >= timeout
    }
}
