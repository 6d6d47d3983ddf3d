//! Waiters owned by the hub, each with its own deadline.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::hub::Link;

/// A correlated call waiting for its reply.
pub(crate) struct PendingCall {
    pub did: Did,
    pub deadline: u64,
    tx: oneshot::Sender<Result<Value>>,
}

impl PendingCall {
    pub fn new(did: Did, deadline: u64) -> (Self, oneshot::Receiver<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        (Self { did, deadline, tx }, rx)
    }

    /// Complete the call. A receiver that gave up already is ignored.
    pub fn resolve(self, ret: Result<Value>) {
        let _ = self.tx.send(ret);
    }
}

/// Outcome of a connection attempt shared by all its waiters.
pub(crate) type ConnectOutcome = std::result::Result<Arc<Link>, Arc<Error>>;

/// A `get` waiting for a connection attempt.
pub(crate) struct PendingConn {
    pub deadline: u64,
    tx: oneshot::Sender<ConnectOutcome>,
}

impl PendingConn {
    pub fn new(deadline: u64) -> (Self, oneshot::Receiver<ConnectOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { deadline, tx }, rx)
    }

    pub fn resolve(self, outcome: ConnectOutcome) {
        let _ = self.tx.send(outcome);
    }
}
