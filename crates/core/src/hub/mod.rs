//! Connection hub: the live links of a node, keyed by remote id.
//!
//! The hub owns three tables and is the only one to mutate them:
//! - links, at most one per remote node;
//! - pending calls, a correlation token to a waiter with a deadline;
//! - pending connections, a remote node to the waiters of its connection attempt.
//!
//! A missing link is established lazily through [HubDelegate::connect]. Concurrent
//! [Hub::get] for one node share a single attempt. Every wait carries a deadline
//! that [Hub::check_timeouts] enforces, a reply that shows up after its waiter is
//! gone is dropped.

mod callback;
mod link;
mod pending;

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::sync::Weak;
use std::time::Duration;

pub use callback::HubCallback;
pub use callback::HubDelegate;
use chordmesh_transport::core::callback::TransportCallback;
use chordmesh_transport::core::transport::ConnectionInterface;
use chordmesh_transport::core::transport::TransportInterface;
use chordmesh_transport::core::transport::TransportMessage;
use chordmesh_transport::Connection;
use chordmesh_transport::Transport;
use dashmap::DashMap;
pub use link::Link;
use pending::ConnectOutcome;
use pending::PendingCall;
use pending::PendingConn;
use serde_json::Value;

use crate::config::HubConfig;
use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::Envelope;
use crate::message::Event;
use crate::message::Query;
use crate::message::Token;
use crate::utils::get_epoch_ms;

/// Live links of one node.
pub struct Hub {
    did: Did,
    config: HubConfig,
    transport: Transport,
    links: DashMap<Did, Arc<Link>>,
    pending_calls: DashMap<Token, PendingCall>,
    pending_conns: Mutex<HashMap<Did, Vec<PendingConn>>>,
    failed_conns: DashMap<Did, u64>,
    next_token: AtomicU64,
    delegate: RwLock<Option<Weak<dyn HubDelegate>>>,
    this: Weak<Hub>,
}

impl Hub {
    /// Create a hub for node `did`, creating connections with `transport`.
    pub fn new(did: Did, transport: Transport, config: HubConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            did,
            config,
            transport,
            links: DashMap::new(),
            pending_calls: DashMap::new(),
            pending_conns: Mutex::new(HashMap::new()),
            failed_conns: DashMap::new(),
            next_token: AtomicU64::new(rand::random::<u32>() as u64 + 1),
            delegate: RwLock::new(None),
            this: this.clone(),
        })
    }

    /// Did of the owning node.
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// The transport links are created with.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Install the owner. Only a weak reference is kept.
    pub fn set_delegate(&self, delegate: Weak<dyn HubDelegate>) -> Result<()> {
        let mut slot = self.delegate.write().map_err(|_| Error::DHTSyncLockError)?;
        *slot = Some(delegate);
        Ok(())
    }

    fn delegate(&self) -> Option<Arc<dyn HubDelegate>> {
        self.delegate
            .read()
            .ok()
            .and_then(|d| d.as_ref().and_then(|w| w.upgrade()))
    }

    fn lock_pending_conns(&self) -> Result<MutexGuard<HashMap<Did, Vec<PendingConn>>>> {
        self.pending_conns
            .lock()
            .map_err(|_| Error::DHTSyncLockError)
    }

    /// Create a connection bound to this hub, leading to `did`.
    /// It is registered only once [Hub::add] is called with it.
    pub async fn new_connection(&self, did: &Did) -> Result<Arc<Connection>> {
        if did == &self.did {
            return Err(Error::ShouldNotConnectSelf);
        }
        let callback = HubCallback::new(self.this.clone(), did.clone()).boxed();
        Ok(self
            .transport
            .new_connection(&did.to_string(), callback)
            .await?)
    }

    /// Hand a link over directly to a hub living in the same process, running the
    /// offer and answer exchange without any signaling peer. Both hubs register it.
    pub async fn connect_local(&self, other: &Hub) -> Result<()> {
        let conn = self.new_connection(other.did()).await?;
        let remote = other.new_connection(&self.did).await?;
        let handshake = async {
            let offer = conn.create_offer().await?;
            let answer = remote.answer_offer(offer).await?;
            conn.accept_answer(answer).await?;
            conn.wait_for_data_channel_open().await?;
            remote.wait_for_data_channel_open().await
        };
        if let Err(e) = handshake.await {
            let _ = conn.close().await;
            let _ = remote.close().await;
            return Err(e.into());
        }
        other.add(&self.did, remote).await?;
        self.add(other.did(), conn).await?;
        Ok(())
    }

    /// Whether a link to `did` is registered.
    pub fn has(&self, did: &Did) -> bool {
        self.links.contains_key(did)
    }

    /// The registered link to `did`, without connecting.
    pub fn link(&self, did: &Did) -> Option<Arc<Link>> {
        self.links.get(did).map(|l| l.value().clone())
    }

    /// Ids of all registered links.
    pub fn dids(&self) -> Vec<Did> {
        self.links.iter().map(|kv| kv.key().clone()).collect()
    }

    /// Number of registered links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no link is registered.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The link with the oldest activity, skipping `except`.
    pub fn oldest_link(&self, except: &Did) -> Option<Did> {
        self.links
            .iter()
            .filter(|kv| kv.key() != except)
            .min_by_key(|kv| kv.value().last_active())
            .map(|kv| kv.key().clone())
    }

    /// A usable link to `did`, connecting lazily if missing.
    /// Concurrent calls for one node share one connection attempt.
    pub async fn get(&self, did: &Did) -> Result<Arc<Link>> {
        if did == &self.did {
            return Err(Error::ShouldNotConnectSelf);
        }
        if let Some(link) = self.link(did) {
            link.touch();
            return Ok(link);
        }
        let now = get_epoch_ms();
        if let Some(failed) = self.failed_conns.get(did).map(|t| *t) {
            if now.saturating_sub(failed) < self.config.failed_connect_backoff {
                return Err(Error::ConnectBackoff(did.clone()));
            }
        }

        let (waiter, rx) = PendingConn::new(now + self.config.peer_connect_timeout);
        let leader = {
            let mut pending = self.lock_pending_conns()?;
            // the attempt may have completed since the first lookup
            if let Some(link) = self.link(did) {
                link.touch();
                return Ok(link);
            }
            let leader = !pending.contains_key(did);
            pending.entry(did.clone()).or_default().push(waiter);
            leader
        };
        if leader {
            self.spawn_connect(did.clone());
        }

        let wait = Duration::from_millis(self.config.peer_connect_timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(Ok(link))) => {
                link.touch();
                Ok(link)
            }
            Ok(Ok(Err(e))) => Err(match e.as_ref() {
                Error::LinkTimeout(d) => Error::LinkTimeout(d.clone()),
                Error::HubDestroyed => Error::HubDestroyed,
                Error::NoIntroducer(d) => Error::NoIntroducer(d.clone()),
                e => Error::ConnectFailed(did.clone(), e.to_string()),
            }),
            Ok(Err(_)) | Err(_) => Err(Error::LinkTimeout(did.clone())),
        }
    }

    fn spawn_connect(&self, did: Did) {
        let Some(hub) = self.this.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tracing::debug!("{} connecting {}", hub.did, did);
            let outcome = match hub.delegate() {
                Some(delegate) => delegate.connect(&did).await,
                None => Err(Error::ConnectFailed(did.clone(), "no connector".to_string())),
            };
            let outcome: ConnectOutcome = outcome
                .and_then(|_| hub.link(&did).ok_or_else(|| Error::ConnectionNotFound(did.clone())))
                .map_err(Arc::new);
            if let Err(e) = &outcome {
                tracing::warn!("{} failed to connect {}: {}", hub.did, did, e);
                hub.failed_conns.insert(did.clone(), get_epoch_ms());
            } else {
                hub.failed_conns.remove(&did);
            }
            let waiters = match hub.lock_pending_conns() {
                Ok(mut pending) => pending.remove(&did).unwrap_or_default(),
                Err(e) => {
                    tracing::error!("{} lost waiters of {}: {}", hub.did, did, e);
                    return;
                }
            };
            for waiter in waiters {
                waiter.resolve(outcome.clone());
            }
        });
    }

    /// Register an established connection to `did`. If a live link to `did` exists
    /// already, it is kept and `conn` is closed.
    pub async fn add(&self, did: &Did, conn: Arc<Connection>) -> Result<Arc<Link>> {
        let (link, duplicate) = {
            match self.links.entry(did.clone()) {
                dashmap::mapref::entry::Entry::Occupied(mut e) => {
                    if e.get().id() == conn.id() {
                        (e.get().clone(), false)
                    } else if e.get().state().is_terminal() {
                        let link = Arc::new(Link::new(conn.clone()));
                        e.insert(link.clone());
                        (link, false)
                    } else {
                        (e.get().clone(), true)
                    }
                }
                dashmap::mapref::entry::Entry::Vacant(e) => {
                    let link = Arc::new(Link::new(conn.clone()));
                    e.insert(link.clone());
                    (link, false)
                }
            }
        };
        if duplicate {
            tracing::debug!("{} already connected to {}, closing added link", self.did, did);
            if let Err(e) = conn.close().await {
                tracing::warn!("{} failed to close duplicate link: {}", self.did, e);
            }
        } else {
            tracing::info!("{} <-> {}", self.did, did);
        }
        Ok(link)
    }

    /// Close and forget the link to `did`.
    pub async fn remove(&self, did: &Did) {
        self.close_link(did).await;
    }

    /// Tear down the link to `did` from inside the hub. The owner learns about it
    /// the same way it learns about a link closed by the remote side.
    async fn drop_link(&self, did: &Did) {
        if self.close_link(did).await {
            if let Some(delegate) = self.delegate() {
                delegate.on_link_lost(did);
            }
        }
    }

    async fn close_link(&self, did: &Did) -> bool {
        let Some((_, link)) = self.links.remove(did) else {
            return false;
        };
        tracing::info!("{} -x- {}", self.did, did);
        if let Err(e) = link.conn().close().await {
            tracing::debug!("{} failed to close link to {}: {}", self.did, did, e);
        }
        true
    }

    /// Close links idle past the recycle timeout, oldest first, never going below
    /// the minimum number of links.
    pub async fn recycle(&self) {
        if self.links.len() <= self.config.min_conns_to_recycle {
            return;
        }
        let now = get_epoch_ms();
        let mut idle: Vec<(Did, u64)> = self
            .links
            .iter()
            .filter(|kv| kv.value().is_idle(now, self.config.peer_recycle_timeout))
            .map(|kv| (kv.key().clone(), kv.value().last_active()))
            .collect();
        idle.sort_by_key(|(_, active)| *active);
        let budget = self.links.len().saturating_sub(self.config.min_conns_to_recycle);
        for (did, _) in idle.into_iter().take(budget) {
            tracing::debug!("{} recycling {}", self.did, did);
            self.drop_link(&did).await;
        }
    }

    async fn transmit(&self, did: &Did, link: &Link, envelope: &Envelope) -> Result<()> {
        let data = match envelope.to_vec() {
            Ok(data) => data,
            Err(e) => {
                self.drop_link(did).await;
                return Err(e);
            }
        };
        match link
            .conn()
            .send_message(TransportMessage::Custom(data))
            .await
        {
            Ok(()) => {
                link.touch();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("{} failed to send to {}: {}", self.did, did, e);
                self.drop_link(did).await;
                Err(e.into())
            }
        }
    }

    fn next_token(&self) -> Token {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, did: &Did, make: impl FnOnce(Token) -> Result<Envelope>) -> Result<Value> {
        let link = self.get(did).await?;
        let token = self.next_token();
        let envelope = make(token)?;
        let (call, rx) = PendingCall::new(did.clone(), get_epoch_ms() + self.config.peer_call_timeout);
        self.pending_calls.insert(token, call);
        if let Err(e) = self.transmit(did, &link, &envelope).await {
            self.pending_calls.remove(&token);
            return Err(e);
        }
        let wait = Duration::from_millis(self.config.peer_call_timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(ret)) => ret,
            Ok(Err(_)) => Err(Error::LinkTimeout(did.clone())),
            Err(_) => {
                self.pending_calls.remove(&token);
                tracing::warn!("{} call {} to {} timed out", self.did, token, did);
                Err(Error::LinkTimeout(did.clone()))
            }
        }
    }

    /// Ask `did` to answer `query`.
    pub async fn query(&self, did: &Did, query: Query) -> Result<Value> {
        self.request(did, |req| Envelope::request(req, &query)).await
    }

    /// Deliver `event` to `did` and wait until it was handled.
    pub async fn call(&self, did: &Did, event: Event) -> Result<()> {
        self.request(did, |call| Ok(Envelope::Call { call, event }))
            .await
            .map(|_| ())
    }

    /// Deliver `event` to `did` without waiting for it to be handled.
    pub async fn send(&self, did: &Did, event: Event) -> Result<()> {
        let link = self.get(did).await?;
        self.transmit(did, &link, &Envelope::Event(event)).await
    }

    /// Reject pending calls and connection waits past their deadline.
    pub fn check_timeouts(&self) -> Result<()> {
        let now = get_epoch_ms();
        {
            let mut pending = self.lock_pending_conns()?;
            for (did, waiters) in pending.iter_mut() {
                let (expired, alive): (Vec<_>, Vec<_>) =
                    waiters.drain(..).partition(|w| w.deadline <= now);
                *waiters = alive;
                for w in expired {
                    w.resolve(Err(Arc::new(Error::LinkTimeout(did.clone()))));
                }
            }
        }
        let expired: Vec<Token> = self
            .pending_calls
            .iter()
            .filter(|kv| kv.value().deadline <= now)
            .map(|kv| *kv.key())
            .collect();
        for token in expired {
            if let Some((_, call)) = self.pending_calls.remove(&token) {
                tracing::warn!("{} call {} to {} timed out", self.did, token, call.did);
                let did = call.did.clone();
                call.resolve(Err(Error::LinkTimeout(did)));
            }
        }
        Ok(())
    }

    /// Reject every waiter and close every link.
    pub async fn destroy(&self) {
        match self.lock_pending_conns() {
            Ok(mut pending) => {
                for (_, waiters) in pending.iter_mut() {
                    for w in waiters.drain(..) {
                        w.resolve(Err(Arc::new(Error::HubDestroyed)));
                    }
                }
            }
            Err(e) => tracing::error!("{} failed to reject connection waits: {}", self.did, e),
        }
        let tokens: Vec<Token> = self.pending_calls.iter().map(|kv| *kv.key()).collect();
        for token in tokens {
            if let Some((_, call)) = self.pending_calls.remove(&token) {
                call.resolve(Err(Error::HubDestroyed));
            }
        }
        for did in self.dids() {
            self.remove(&did).await;
        }
    }

    /// Number of calls waiting for a reply.
    pub fn pending_call_count(&self) -> usize {
        self.pending_calls.len()
    }

    /// A connection to `did` reached a terminal state. The registered link is
    /// dropped if it is the dead one, and the owner learns about the loss.
    pub(crate) fn on_link_closed(&self, did: &Did) {
        if self
            .links
            .remove_if(did, |_, link| link.state().is_terminal())
            .is_some()
        {
            tracing::info!("{} lost link to {}", self.did, did);
            if let Some(delegate) = self.delegate() {
                delegate.on_link_lost(did);
            }
        }
    }

    /// Inbound data from `from`. Replies complete their waiter in place, everything
    /// else is handled in its own task so the link is never blocked by a handler.
    pub(crate) async fn on_message(&self, from: &Did, data: &[u8]) -> Result<()> {
        if let Some(link) = self.link(from) {
            link.touch();
        }
        let envelope = match Envelope::from_slice(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("{} dropped malformed message from {}: {}", self.did, from, e);
                return Ok(());
            }
        };
        match envelope {
            Envelope::Reply { res, ret, err } => {
                if let Some((_, call)) = self.pending_calls.remove(&res) {
                    call.resolve(match err {
                        Some(err) => Err(Error::RemoteError(from.clone(), err)),
                        None => Ok(ret.unwrap_or(Value::Null)),
                    });
                } else {
                    tracing::debug!("{} dropped late reply {} from {}", self.did, res, from);
                }
            }
            Envelope::Request { req, method, arg } => {
                self.spawn_handler(from.clone(), move |hub, delegate, from| async move {
                    let outcome = match Query::from_parts(&method, arg) {
                        Ok(query) => delegate.on_query(&from, query).await,
                        Err(e) => Err(e),
                    };
                    hub.reply(&from, Envelope::reply(req, outcome)).await;
                });
            }
            Envelope::Call { call, event } => {
                self.spawn_handler(from.clone(), move |hub, delegate, from| async move {
                    let outcome = delegate.on_event(&from, event).await.map(|_| Value::Null);
                    hub.reply(&from, Envelope::reply(call, outcome)).await;
                });
            }
            Envelope::Event(event) => {
                self.spawn_handler(from.clone(), move |hub, delegate, from| async move {
                    let name = event.name();
                    if let Err(e) = delegate.on_event(&from, event).await {
                        tracing::warn!("{} failed to handle {} from {}: {}", hub.did, name, from, e);
                    }
                });
            }
        }
        Ok(())
    }

    fn spawn_handler<F, Fut>(&self, from: Did, handler: F)
    where
        F: FnOnce(Arc<Hub>, Arc<dyn HubDelegate>, Did) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (Some(hub), Some(delegate)) = (self.this.upgrade(), self.delegate()) else {
            tracing::warn!("{} has no handler, dropped message from {}", self.did, from);
            return;
        };
        tokio::spawn(handler(hub, delegate, from));
    }

    /// Send a reply. A reply that cannot be delivered tears the link down.
    async fn reply(&self, to: &Did, envelope: Envelope) {
        let Some(link) = self.link(to) else {
            tracing::warn!("{} has no link to reply to {}", self.did, to);
            return;
        };
        if let Err(e) = self.transmit(to, &link, &envelope).await {
            tracing::warn!("{} failed to reply to {}: {}", self.did, to, e);
        }
    }
}
