#![warn(missing_docs)]
//! The overlay of one node: a [RingNode] and a [Hub] wired together.
//!
//! The swarm answers ring queries over the hub, relays events towards their
//! targets, introduces new links through existing ones and runs the periodic
//! maintenance of the ring.

mod builder;
/// Callback interface for swarm
pub mod callback;
mod connect;
mod forward;
mod pubsub;
mod signal;
mod stabilization;

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
pub use builder::SwarmBuilder;
pub use callback::SharedSwarmCallback;
pub use callback::SwarmCallback;
pub use callback::SwarmEvent;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
pub use stabilization::Stabilizer;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

use crate::config::Config;
use crate::dht::Did;
use crate::dht::RingNode;
use crate::dht::RingRpc;
use crate::error::Error;
use crate::error::Result;
use crate::hub::Hub;
use crate::hub::HubDelegate;
use crate::inspect::SwarmInspect;
use crate::message::CustomMessage;
use crate::message::Event;
use crate::message::Query;
use crate::message::Subscribers;
use crate::swarm::signal::SignalBoard;

/// Where a starting swarm finds the ring.
pub enum Bootstrap {
    /// Another swarm of the same process, linked directly.
    Local(Arc<Swarm>),
    /// A peer reachable through a registered link.
    Peer(Did),
}

/// The ring node and link management of one peer.
pub struct Swarm {
    did: Did,
    config: Config,
    node: RingNode,
    hub: Arc<Hub>,
    signals: SignalBoard,
    /// Digests of the last ticks, see [Stabilizer::adjust_finger_size].
    node_states: Mutex<VecDeque<String>>,
    /// Subscribers of the channels this node subscribed to, by hashed channel.
    subscriptions: DashMap<Did, Subscribers>,
    callback: RwLock<SharedSwarmCallback>,
    error_sender: Option<UnboundedSender<Error>>,
    started: AtomicBool,
    polling: AtomicBool,
    stop_notify: Notify,
    this: Weak<Swarm>,
}

impl Swarm {
    /// Get did of self.
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// The ring state of self.
    pub fn node(&self) -> &RingNode {
        &self.node
    }

    /// The links of self.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Config the swarm was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the maintenance loop runs.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn callback(&self) -> Result<SharedSwarmCallback> {
        Ok(self
            .callback
            .read()
            .map_err(|_| Error::CallbackSyncLockError)?
            .clone())
    }

    /// Set callback for swarm.
    pub fn set_callback(&self, callback: SharedSwarmCallback) -> Result<()> {
        let mut inner = self
            .callback
            .write()
            .map_err(|_| Error::CallbackSyncLockError)?;

        *inner = callback;

        Ok(())
    }

    pub(crate) async fn emit(&self, event: SwarmEvent) {
        let callback = match self.callback() {
            Ok(cb) => cb,
            Err(e) => {
                tracing::error!("{} failed to get callback: {}", self.did, e);
                return;
            }
        };
        if let Err(e) = callback.on_event(&event).await {
            tracing::warn!("{} callback failed on {:?}: {}", self.did, event, e);
        }
    }

    pub(crate) async fn deliver_message(&self, msg: &CustomMessage) -> Result<()> {
        if let Err(e) = self.callback()?.on_message(msg).await {
            tracing::warn!(
                "{} callback failed on message {} from {}: {}",
                self.did,
                msg.name,
                msg.from,
                e
            );
        }
        Ok(())
    }

    /// Log a maintenance failure and hand it to the error channel, if any.
    pub(crate) fn report_error(&self, e: Error) {
        tracing::error!("{} maintenance failed: {}", self.did, e);
        if let Some(sender) = &self.error_sender {
            let _ = sender.send(e);
        }
    }

    /// Drop a dead peer from the ring view and its link from the hub.
    pub(crate) async fn forget(&self, did: &Did) {
        if let Err(e) = self.node.remove(did) {
            tracing::error!("{} failed to remove {} from ring: {}", self.did, did, e);
        }
        self.hub.remove(did).await;
    }

    /// Join the ring, link to `bootstrap` first when given, then run the
    /// maintenance loop until [Swarm::stop].
    /// A node that already has a successor does not join again.
    pub async fn start(&self, bootstrap: Option<Bootstrap>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::SwarmAlreadyStarted);
        }
        if let Some(bootstrap) = bootstrap {
            if let Err(e) = self.boot(bootstrap).await {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        let stabilizer = Arc::new(Stabilizer::new(self.this.clone()));
        let interval = Duration::from_millis(self.config.swarm.stabilize_interval);
        tokio::spawn(stabilizer.wait(interval));
        tracing::info!("{} started", self.did);
        Ok(())
    }

    async fn boot(&self, bootstrap: Bootstrap) -> Result<()> {
        let peer = match bootstrap {
            Bootstrap::Local(other) => self.connect_local(&other).await?,
            Bootstrap::Peer(did) => did,
        };
        if self.node.successor()? == self.did {
            self.join(&peer).await
        } else {
            Ok(())
        }
    }

    /// Join the ring known by `bootstrap`, retrying with a pause between attempts.
    pub async fn join(&self, bootstrap: &Did) -> Result<()> {
        let retry = self.config.swarm.max_join_retry;
        for attempt in 1..=retry {
            match self.node.join(bootstrap, self).await {
                Ok(()) => {
                    tracing::info!("{} joined via {}", self.did, bootstrap);
                    return Ok(());
                }
                Err(Error::ShouldNotConnectSelf) => return Err(Error::ShouldNotConnectSelf),
                Err(e) => {
                    tracing::warn!(
                        "{} failed to join via {} ({}/{}): {}",
                        self.did,
                        bootstrap,
                        attempt,
                        retry,
                        e
                    );
                    if attempt < retry {
                        let backoff = self.config.swarm.join_retry_backoff;
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }
        Err(Error::JoinFailure(bootstrap.clone(), retry))
    }

    /// End the maintenance loop and tear down every link.
    pub async fn stop(&self) {
        if self.started.swap(false, Ordering::SeqCst) {
            tracing::info!("{} stopped", self.did);
        }
        self.stop_notify.notify_one();
        self.hub.destroy().await;
    }

    /// Run one maintenance tick now. Skipped if a tick is running already.
    pub async fn tick(&self) -> Result<()> {
        Stabilizer::new(self.this.clone()).stabilize().await
    }

    /// Send an application message `name` carrying `data` to every target.
    /// `ttl` defaults to the configured forward ttl.
    pub async fn send(
        &self,
        targets: Vec<Did>,
        name: &str,
        data: Value,
        ttl: Option<u32>,
    ) -> Result<()> {
        let event = Event::Message(CustomMessage {
            from: self.did.clone(),
            name: name.to_string(),
            data,
        });
        let ttl = ttl.unwrap_or(self.config.swarm.forward_ttl);
        self.forward(targets, event, ttl).await
    }

    /// Store `value` under `key` in the ring.
    pub async fn put<K>(&self, key: &K, value: Value) -> Result<()>
    where K: Serialize + ?Sized {
        self.node.put(key, value, self).await
    }

    /// Read the value under `key` from the ring.
    pub async fn get<K>(&self, key: &K) -> Result<Option<Value>>
    where K: Serialize + ?Sized {
        self.node.get(key, self).await
    }

    /// The node responsible for `id`.
    pub async fn find_successor(&self, id: &Did) -> Result<Did> {
        self.node.find_successor(id, self).await
    }

    /// The predecessor of the node responsible for `id`.
    pub async fn find_predecessor(&self, id: &Did) -> Result<Did> {
        self.node.find_predecessor(id, self).await
    }

    /// Check the status of swarm
    pub async fn inspect(&self) -> SwarmInspect {
        SwarmInspect::inspect(self).await
    }
}

#[async_trait]
impl RingRpc for Swarm {
    async fn query(&self, did: &Did, query: Query) -> Result<Value> {
        if did == &self.did {
            return self.node.handle_query(query, self).await;
        }
        let method = query.method();
        match self.hub.query(did, query).await {
            Err(e) if e.is_link_failure() => {
                tracing::warn!("{} peer {} seems dead on {}: {}", self.did, did, method, e);
                self.forget(did).await;
                Err(e)
            }
            ret => ret,
        }
    }
}

#[async_trait]
impl HubDelegate for Swarm {
    async fn connect(&self, did: &Did) -> Result<()> {
        Swarm::connect(self, did).await
    }

    async fn on_query(&self, _from: &Did, query: Query) -> Result<Value> {
        self.node.handle_query(query, self).await
    }

    async fn on_event(&self, from: &Did, event: Event) -> Result<()> {
        self.handle_event(from, event).await
    }

    fn on_link_lost(&self, did: &Did) {
        tracing::info!("{} lost {}", self.did, did);
        if let Err(e) = self.node.remove(did) {
            tracing::error!("{} failed to remove {} from ring: {}", self.did, did, e);
        }
        if let Some(this) = self.this.upgrade() {
            let peer = did.clone();
            tokio::spawn(async move { this.emit(SwarmEvent::PeerLost { peer }).await });
        }
    }
}
