use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rand::distributions::Distribution;

use crate::callback::InnerTransportCallback;
use crate::core::callback::BoxedTransportCallback;
use crate::core::transport::ConnectionInterface;
use crate::core::transport::ConnectionState;
use crate::core::transport::TransportInterface;
use crate::core::transport::TransportMessage;
use crate::error::Error;
use crate::error::Result;
use crate::notifier::Notifier;

/// Default time a connection waits for its remote side to accept.
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry of every live [MemoryConnection] of one in-process network.
/// Offers and answers are connection ids looked up here. Each test or local
/// ring owns its own network, nothing is shared between networks.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    conns: Arc<DashMap<String, Arc<MemoryConnection>>>,
    send_delay: Option<(u64, u64)>,
}

/// A connection on a [MemoryNetwork].
/// Implements the [ConnectionInterface] trait with no real network.
pub struct MemoryConnection {
    rand_id: String,
    network: MemoryNetwork,
    callback: Arc<InnerTransportCallback>,
    notifier: Notifier,
    open_timeout: Duration,
    remote_rand_id: Mutex<Option<String>>,
    state: Mutex<ConnectionState>,
}

/// [MemoryTransport] creates [MemoryConnection] on a given [MemoryNetwork].
#[derive(Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    open_timeout: Duration,
}

impl MemoryNetwork {
    /// Create an empty network that delivers messages immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty network that delays each message by a random
    /// number of milliseconds in `min..max`.
    pub fn with_delay(min: u64, max: u64) -> Self {
        Self {
            conns: Arc::new(DashMap::new()),
            send_delay: Some((min, max.max(min + 1))),
        }
    }

    /// Number of connections that are registered and not closed.
    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    fn connection(&self, rand_id: &str) -> Option<Arc<MemoryConnection>> {
        self.conns.get(rand_id).map(|c| c.value().clone())
    }

    async fn delay(&self) {
        if let Some((min, max)) = self.send_delay {
            let range = rand::distributions::Uniform::new(min, max);
            let ms = range.sample(&mut rand::thread_rng());
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl MemoryConnection {
    fn new(cid: &str, network: MemoryNetwork, callback: BoxedTransportCallback, open_timeout: Duration) -> Self {
        let notifier = Notifier::default();
        Self {
            rand_id: format!("{:016x}", rand::random::<u64>()),
            network,
            callback: Arc::new(InnerTransportCallback::new(cid, callback, notifier.clone())),
            notifier,
            open_timeout,
            remote_rand_id: Mutex::new(None),
            state: Mutex::new(ConnectionState::New),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, ConnectionState>> {
        self.state.lock().map_err(|_| Error::LockPoisoned)
    }

    fn lock_remote_rand_id(&self) -> Result<MutexGuard<'_, Option<String>>> {
        self.remote_rand_id.lock().map_err(|_| Error::LockPoisoned)
    }

    fn remote_conn(&self) -> Result<Arc<MemoryConnection>> {
        let cid = { self.lock_remote_rand_id()?.clone() }
            .ok_or_else(|| Error::ConnectionNotEstablished(self.rand_id.clone()))?;
        self.network
            .connection(&cid)
            .ok_or(Error::ConnectionClosed(cid))
    }

    fn set_remote_rand_id(&self, rand_id: String) -> Result<()> {
        let mut remote_rand_id = self.lock_remote_rand_id()?;
        *remote_rand_id = Some(rand_id);
        Ok(())
    }

    async fn set_connection_state(&self, state: ConnectionState) -> Result<()> {
        {
            let mut current = self.lock_state()?;
            if state == *current {
                return Ok(());
            }
            *current = state;
        }

        self.callback.on_peer_connection_state_change(state).await;
        Ok(())
    }
}

impl MemoryTransport {
    /// Create a new [MemoryTransport] attached to `network`.
    pub fn new(network: MemoryNetwork) -> Self {
        Self {
            network,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    /// Override how long a connection waits for its remote side to accept.
    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    /// The network this transport creates connections on.
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

#[async_trait]
impl ConnectionInterface for MemoryConnection {
    type Sdp = String;
    type Error = Error;

    fn id(&self) -> &str {
        &self.rand_id
    }

    async fn send_message(&self, msg: TransportMessage) -> Result<()> {
        self.network.delay().await;
        self.wait_for_data_channel_open().await?;
        let data = bincode::serialize(&msg).map(Bytes::from)?;
        let remote = self.remote_conn()?;
        if remote.connection_state().is_terminal() {
            return Err(Error::ConnectionClosed(remote.rand_id.clone()));
        }
        remote.callback.on_message(&data).await;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.lock_state()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Failed)
    }

    async fn create_offer(&self) -> Result<Self::Sdp> {
        if self.connection_state().is_terminal() {
            return Err(Error::ConnectionClosed(self.rand_id.clone()));
        }
        Ok(self.rand_id.clone())
    }

    async fn answer_offer(&self, offer: Self::Sdp) -> Result<Self::Sdp> {
        if self.network.connection(&offer).is_none() {
            return Err(Error::UnknownSdp(offer));
        }
        self.set_remote_rand_id(offer)?;
        self.set_connection_state(ConnectionState::Connecting)
            .await?;
        Ok(self.rand_id.clone())
    }

    async fn accept_answer(&self, answer: Self::Sdp) -> Result<()> {
        let Some(remote_conn) = self.network.connection(&answer) else {
            return Err(Error::UnknownSdp(answer));
        };
        self.set_remote_rand_id(answer)?;
        self.set_connection_state(ConnectionState::Connected)
            .await?;
        remote_conn
            .set_connection_state(ConnectionState::Connected)
            .await
    }

    async fn wait_for_data_channel_open(&self) -> Result<()> {
        match self.connection_state() {
            ConnectionState::Connected => return Ok(()),
            s if s.is_terminal() => {
                return Err(Error::DataChannelOpen(format!(
                    "connection {} is {s:?}",
                    self.rand_id
                )))
            }
            _ => {}
        }

        self.notifier.set_timeout(self.open_timeout);
        self.notifier.clone().await;

        if self.connection_state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(Error::DataChannelOpen(format!(
                "connection {} not accepted within {:?}",
                self.rand_id, self.open_timeout
            )))
        }
    }

    async fn close(&self) -> Result<()> {
        self.network.conns.remove(&self.rand_id);
        if self.connection_state().is_terminal() {
            return Ok(());
        }
        self.set_connection_state(ConnectionState::Closed).await?;

        // simulate remote closing if it's not closed
        if let Ok(remote_conn) = self.remote_conn() {
            if !remote_conn.connection_state().is_terminal() {
                remote_conn
                    .set_connection_state(ConnectionState::Disconnected)
                    .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl TransportInterface for MemoryTransport {
    type Connection = MemoryConnection;
    type Error = Error;

    async fn new_connection(
        &self,
        cid: &str,
        callback: BoxedTransportCallback,
    ) -> Result<Arc<Self::Connection>> {
        let conn = Arc::new(MemoryConnection::new(
            cid,
            self.network.clone(),
            callback,
            self.open_timeout,
        ));
        self.network
            .conns
            .insert(conn.rand_id.clone(), conn.clone());
        tracing::debug!("new memory connection {} for {}", conn.rand_id, cid);
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::core::callback::TransportCallback;

    #[derive(Default, Clone)]
    struct CountingCallback {
        messages: Arc<Mutex<Vec<Vec<u8>>>>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransportCallback for CountingCallback {
        async fn on_message(
            &self,
            _cid: &str,
            msg: &[u8],
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.messages.lock().unwrap().push(msg.to_vec());
            Ok(())
        }

        async fn on_peer_connection_state_change(
            &self,
            _cid: &str,
            state: ConnectionState,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if state.is_terminal() {
                self.closed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    async fn handshake(
        t1: &MemoryTransport,
        t2: &MemoryTransport,
        cb1: CountingCallback,
        cb2: CountingCallback,
    ) -> (Arc<MemoryConnection>, Arc<MemoryConnection>) {
        let c1 = t1.new_connection("b", cb1.boxed()).await.unwrap();
        let c2 = t2.new_connection("a", cb2.boxed()).await.unwrap();
        let offer = c1.create_offer().await.unwrap();
        let answer = c2.answer_offer(offer).await.unwrap();
        assert_eq!(c2.connection_state(), ConnectionState::Connecting);
        c1.accept_answer(answer).await.unwrap();
        c1.wait_for_data_channel_open().await.unwrap();
        c2.wait_for_data_channel_open().await.unwrap();
        (c1, c2)
    }

    #[tokio::test]
    async fn test_handshake_and_send() {
        let network = MemoryNetwork::new();
        let t1 = MemoryTransport::new(network.clone());
        let t2 = MemoryTransport::new(network.clone());
        let (cb1, cb2) = (CountingCallback::default(), CountingCallback::default());
        let (c1, c2) = handshake(&t1, &t2, cb1.clone(), cb2.clone()).await;

        assert_eq!(c1.connection_state(), ConnectionState::Connected);
        assert_eq!(c2.connection_state(), ConnectionState::Connected);

        c1.send_message(TransportMessage::Custom(b"hello".to_vec()))
            .await
            .unwrap();
        c2.send_message(TransportMessage::Custom(b"world".to_vec()))
            .await
            .unwrap();

        assert_eq!(cb2.messages.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
        assert_eq!(cb1.messages.lock().unwrap().as_slice(), &[b"world".to_vec()]);
    }

    #[tokio::test]
    async fn test_close_notifies_remote() {
        let network = MemoryNetwork::new();
        let t1 = MemoryTransport::new(network.clone());
        let t2 = MemoryTransport::new(network.clone());
        let (cb1, cb2) = (CountingCallback::default(), CountingCallback::default());
        let (c1, c2) = handshake(&t1, &t2, cb1.clone(), cb2.clone()).await;
        assert_eq!(network.connection_count(), 2);

        c1.close().await.unwrap();
        assert_eq!(c1.connection_state(), ConnectionState::Closed);
        assert_eq!(c2.connection_state(), ConnectionState::Disconnected);
        assert_eq!(cb1.closed.load(Ordering::SeqCst), 1);
        assert_eq!(cb2.closed.load(Ordering::SeqCst), 1);

        assert!(c2
            .send_message(TransportMessage::Custom(vec![]))
            .await
            .is_err());

        c2.close().await.unwrap();
        assert_eq!(cb2.closed.load(Ordering::SeqCst), 1);
        assert_eq!(network.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_open_times_out() {
        let network = MemoryNetwork::new();
        let t1 = MemoryTransport::new(network).with_open_timeout(Duration::from_millis(100));
        let c1 = t1
            .new_connection("nobody", CountingCallback::default().boxed())
            .await
            .unwrap();
        c1.create_offer().await.unwrap();
        assert!(matches!(
            c1.wait_for_data_channel_open().await,
            Err(Error::DataChannelOpen(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_offer() {
        let network = MemoryNetwork::with_delay(0, 5);
        let t1 = MemoryTransport::new(network);
        let c1 = t1
            .new_connection("x", CountingCallback::default().boxed())
            .await
            .unwrap();
        assert!(matches!(
            c1.answer_offer("missing".to_string()).await,
            Err(Error::UnknownSdp(_))
        ));
    }
}
