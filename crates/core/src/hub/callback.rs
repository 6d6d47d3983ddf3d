//! Seams between the hub, its connections and its owner.

use std::sync::Weak;

use async_trait::async_trait;
use chordmesh_transport::core::callback::TransportCallback;
use chordmesh_transport::core::transport::ConnectionState;
use serde_json::Value;

use crate::dht::Did;
use crate::error::Result;
use crate::hub::Hub;
use crate::message::Event;
use crate::message::Query;

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// The owner of a [Hub]. It establishes links the hub misses and handles what
/// remote peers ask for.
#[async_trait]
pub trait HubDelegate: Send + Sync {
    /// Establish a link to `did` and register it with [Hub::add].
    async fn connect(&self, did: &Did) -> Result<()>;

    /// Answer a query of `from`.
    async fn on_query(&self, from: &Did, query: Query) -> Result<Value>;

    /// Handle an event of `from`, correlated or not.
    async fn on_event(&self, from: &Did, event: Event) -> Result<()>;

    /// The registered link to `did` went away without being removed locally.
    fn on_link_lost(&self, did: &Did);
}

/// [HubCallback] binds one connection to the hub, it knows which node the
/// connection leads to.
pub struct HubCallback {
    hub: Weak<Hub>,
    did: Did,
}

impl HubCallback {
    /// Create a new [HubCallback] for a connection to `did`.
    pub fn new(hub: Weak<Hub>, did: Did) -> Self {
        Self { hub, did }
    }
}

#[async_trait]
impl TransportCallback for HubCallback {
    async fn on_message(&self, _cid: &str, msg: &[u8]) -> std::result::Result<(), CallbackError> {
        let Some(hub) = self.hub.upgrade() else {
            return Ok(());
        };
        hub.on_message(&self.did, msg).await?;
        Ok(())
    }

    async fn on_peer_connection_state_change(
        &self,
        _cid: &str,
        state: ConnectionState,
    ) -> std::result::Result<(), CallbackError> {
        let Some(hub) = self.hub.upgrade() else {
            return Ok(());
        };
        tracing::debug!("{} link to {} is {:?}", hub.did(), self.did, state);
        if state.is_terminal() {
            hub.on_link_closed(&self.did);
        }
        Ok(())
    }
}
