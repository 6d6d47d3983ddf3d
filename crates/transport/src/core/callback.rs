//! Callback interface of a connection.

use async_trait::async_trait;

use crate::core::transport::ConnectionState;

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Any object that implements this trait can be bound to a connection
/// to receive its messages and state changes.
#[async_trait]
pub trait TransportCallback {
    /// Box the callback.
    fn boxed(self) -> BoxedTransportCallback
    where Self: Sized + Send + Sync + 'static {
        Box::new(self)
    }

    /// Invoked for each message delivered by the connection bound to `cid`.
    async fn on_message(&self, _cid: &str, _msg: &[u8]) -> Result<(), CallbackError> {
        Ok(())
    }

    /// Invoked whenever the state of the connection bound to `cid` changes.
    async fn on_peer_connection_state_change(
        &self,
        _cid: &str,
        _state: ConnectionState,
    ) -> Result<(), CallbackError> {
        Ok(())
    }
}

/// Boxed callback bound to a connection.
pub type BoxedTransportCallback = Box<dyn TransportCallback + Send + Sync>;
