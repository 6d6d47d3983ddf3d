use std::sync::Arc;

use async_trait::async_trait;

use crate::dht::Did;
use crate::message::CustomMessage;
use crate::message::Subscribers;

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Shared [SwarmCallback] trait object.
pub type SharedSwarmCallback = Arc<dyn SwarmCallback + Send + Sync>;

/// Used to notify the application of events that occur in the swarm.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SwarmEvent {
    /// A link to a peer was registered.
    PeerConnected {
        /// The did of remote peer.
        peer: Did,
    },
    /// A link to a peer went away and the peer left the ring view.
    PeerLost {
        /// The did of remote peer.
        peer: Did,
    },
    /// A ping came back or was relayed here.
    Ping,
    /// The subscribers of a channel changed.
    SubscriptionUpdate {
        /// hashed channel key
        channel: Did,
        /// subscribers after the change
        subscribers: Subscribers,
    },
}

/// Any object that implements this trait can be used as a callback for the swarm.
#[async_trait]
pub trait SwarmCallback {
    /// This method is invoked for each application message delivered to this node.
    async fn on_message(&self, _msg: &CustomMessage) -> Result<(), CallbackError> {
        Ok(())
    }

    /// This method is invoked after the swarm handled a change.
    async fn on_event(&self, _event: &SwarmEvent) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Callback ignoring everything.
pub(crate) struct DefaultCallback;

impl SwarmCallback for DefaultCallback {}
