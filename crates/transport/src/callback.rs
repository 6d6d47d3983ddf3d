//! Glue between a connection and its [TransportCallback](crate::core::callback::TransportCallback).

use bytes::Bytes;

use crate::core::callback::BoxedTransportCallback;
use crate::core::transport::ConnectionState;
use crate::core::transport::TransportMessage;
use crate::notifier::Notifier;

/// Decodes frames for a connection and forwards them to the user callback.
/// It also wakes the open notifier of the connection when its state settles.
pub struct InnerTransportCallback {
    /// The id given to the connection when it was created.
    pub cid: String,
    callback: BoxedTransportCallback,
    notifier: Notifier,
}

impl InnerTransportCallback {
    /// Create a new [InnerTransportCallback] instance.
    pub fn new(cid: &str, callback: BoxedTransportCallback, notifier: Notifier) -> Self {
        Self {
            cid: cid.to_string(),
            callback,
            notifier,
        }
    }

    /// Decode a frame and hand its payload to the user callback.
    pub async fn on_message(&self, msg: &Bytes) {
        let msg: TransportMessage = match bincode::deserialize(msg) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Deserialize TransportMessage failed: {e:?}");
                return;
            }
        };

        match msg {
            TransportMessage::Custom(bytes) => {
                if let Err(e) = self.callback.on_message(&self.cid, &bytes).await {
                    tracing::error!("Callback on_message failed: {e:?}")
                }
            }
        }
    }

    /// Report a state change and release waiters of the open notifier.
    pub async fn on_peer_connection_state_change(&self, state: ConnectionState) {
        if state == ConnectionState::Connected || state.is_terminal() {
            self.notifier.wake()
        }

        if let Err(e) = self
            .callback
            .on_peer_connection_state_change(&self.cid, state)
            .await
        {
            tracing::error!("Callback on_peer_connection_state_change failed: {e:?}")
        }
    }
}
