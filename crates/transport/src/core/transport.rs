//! Link level traits and message frame.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::core::callback::BoxedTransportCallback;

/// The frame sent over a connection. The payload is opaque to this crate.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    /// Application bytes.
    Custom(Vec<u8>),
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Created, no offer or answer exchanged yet.
    New,
    /// An offer was answered but the answer is not accepted yet.
    Connecting,
    /// Both sides are bound, messages can flow.
    Connected,
    /// The remote side went away.
    Disconnected,
    /// Handshake or delivery failed.
    Failed,
    /// Closed locally.
    Closed,
}

impl ConnectionState {
    /// Whether the connection can never carry messages again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Closed
        )
    }
}

/// One duplex link to a remote peer.
#[async_trait]
pub trait ConnectionInterface {
    /// Offer and answer payload exchanged through a signaling channel.
    type Sdp: Serialize + DeserializeOwned + Send + Sync;
    /// Error type of the connection.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Unique id of this connection object.
    fn id(&self) -> &str;

    /// Send a frame to the remote side.
    async fn send_message(&self, msg: TransportMessage) -> Result<(), Self::Error>;

    /// Current state.
    fn connection_state(&self) -> ConnectionState;

    /// Create an offer to be relayed to the remote side.
    async fn create_offer(&self) -> Result<Self::Sdp, Self::Error>;

    /// Answer an offer received from the remote side.
    async fn answer_offer(&self, offer: Self::Sdp) -> Result<Self::Sdp, Self::Error>;

    /// Accept the answer of a previously created offer.
    async fn accept_answer(&self, answer: Self::Sdp) -> Result<(), Self::Error>;

    /// Wait until the connection can carry messages, or fail after the timeout.
    async fn wait_for_data_channel_open(&self) -> Result<(), Self::Error>;

    /// Close the connection. The remote side observes a disconnect.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// Factory of connections.
#[async_trait]
pub trait TransportInterface {
    /// Connection type produced by this transport.
    type Connection: ConnectionInterface<Error = Self::Error>;
    /// Error type of the transport.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a connection bound to `cid`. Inbound messages and state changes
    /// of the connection are reported to `callback`.
    async fn new_connection(
        &self,
        cid: &str,
        callback: BoxedTransportCallback,
    ) -> Result<Arc<Self::Connection>, Self::Error>;
}
