//! Chord algorithm implement.
#![warn(missing_docs)]
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use futures::future::join_all;
use futures::future::try_join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;

use super::did::in_range;
use super::BackupList;
use super::FingerTable;
use crate::config::NodeConfig;
use crate::dht::Did;
use crate::dht::IdSpace;
use crate::error::Error;
use crate::error::Result;
use crate::message::from_ret;
use crate::message::PutArg;
use crate::message::Query;
use crate::message::SubscribeArg;
use crate::message::Subscribers;
use crate::storage::KvStorageInterface;
use crate::storage::MemStorage;
use crate::storage::StoredValue;
use crate::utils::get_epoch_ms;

/// Remote side of a [RingNode]: answers a [Query] on behalf of the node `did`.
/// The swarm implements it over peer links, tests implement it in memory.
#[async_trait]
pub trait RingRpc: Send + Sync {
    /// Ask node `did` to answer `query`.
    async fn query(&self, did: &Did, query: Query) -> Result<Value>;
}

/// RingNode is the Chord state machine of one peer.
/// All nodes form a clockwise ring in the order of [Did].
///
/// Ring pointers are ids only. Turning an id into a link is the business of
/// whatever [RingRpc] the caller passes in, so the node never holds a peer.
/// No lock is held across a remote call.
pub struct RingNode {
    did: Did,
    space: IdSpace,
    lookup_ttl: u32,
    config: NodeConfig,
    /// [FingerTable] help node to find successor quickly, slot 0 is the successor.
    finger: Mutex<FingerTable>,
    /// The previous node on the ring, the node itself when unknown.
    predecessor: Mutex<Did>,
    succ_backups: Mutex<BackupList>,
    pred_backups: Mutex<BackupList>,
    storage: MemStorage<StoredValue>,
}

impl RingNode {
    /// A node alone on its ring, pointing at itself everywhere.
    pub fn new(did: Did, space: IdSpace, config: NodeConfig) -> Self {
        Self {
            lookup_ttl: config.lookup_ttl.unwrap_or_else(|| space.bits()),
            finger: Mutex::new(FingerTable::new(did.clone(), config.finger_table_size)),
            predecessor: Mutex::new(did.clone()),
            succ_backups: Mutex::new(BackupList::new(did.clone(), config.succ_list_size)),
            pred_backups: Mutex::new(BackupList::new(did.clone(), config.succ_list_size)),
            storage: MemStorage::new(),
            space,
            config,
            did,
        }
    }

    /// Own id.
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// Id space of the ring.
    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    /// Lock and return MutexGuard of finger table.
    pub fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of predecessor.
    pub fn lock_predecessor(&self) -> Result<MutexGuard<Did>> {
        self.predecessor.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of successor backups.
    pub fn lock_succ_backups(&self) -> Result<MutexGuard<BackupList>> {
        self.succ_backups.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Lock and return MutexGuard of predecessor backups.
    pub fn lock_pred_backups(&self) -> Result<MutexGuard<BackupList>> {
        self.pred_backups.lock().map_err(|_| Error::DHTSyncLockError)
    }

    /// Current successor.
    pub fn successor(&self) -> Result<Did> {
        Ok(self.lock_finger()?.successor().clone())
    }

    /// Current predecessor, the node itself when unknown.
    pub fn predecessor(&self) -> Result<Did> {
        Ok(self.lock_predecessor()?.clone())
    }

    /// Whether the node believes to be alone, i.e. not joined yet.
    pub fn is_alone(&self) -> Result<bool> {
        Ok(self.successor()? == self.did)
    }

    /// Snapshot of the finger table.
    pub fn fingers(&self) -> Result<Vec<Did>> {
        Ok(self.lock_finger()?.list().clone())
    }

    /// Number of finger slots.
    pub fn finger_len(&self) -> Result<usize> {
        Ok(self.lock_finger()?.len())
    }

    /// Drop the farthest finger slot.
    pub fn pop_finger(&self) -> Result<Option<Did>> {
        Ok(self.lock_finger()?.pop())
    }

    /// Successor backups, excluding the successor.
    pub fn succ_backups(&self) -> Result<Vec<Did>> {
        Ok(self.lock_succ_backups()?.list().clone())
    }

    /// Predecessor backups, excluding the predecessor.
    pub fn pred_backups(&self) -> Result<Vec<Did>> {
        Ok(self.lock_pred_backups()?.list().clone())
    }

    /// Successor followed by its backups, what `succWithBackupIds` answers.
    pub fn successor_list(&self) -> Result<Vec<Did>> {
        let successor = self.successor()?;
        Ok(self.lock_succ_backups()?.with_primary(&successor))
    }

    /// Predecessor followed by its backups, what `predWithBackupIds` answers.
    pub fn predecessor_list(&self) -> Result<Vec<Did>> {
        let predecessor = self.predecessor()?;
        Ok(self.lock_pred_backups()?.with_primary(&predecessor))
    }

    /// One line digest of the routing state, equal between ticks iff nothing moved.
    pub fn state_digest(&self) -> Result<String> {
        let join = |ids: &[Did]| {
            ids.iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        Ok(format!(
            "{};{};{}",
            join(&self.fingers()?),
            self.predecessor()?,
            join(&self.succ_backups()?)
        ))
    }

    /// `id <- (predecessor, self]`
    pub fn is_responsible_for(&self, id: &Did) -> Result<bool> {
        let predecessor = self.predecessor()?;
        Ok(in_range(&predecessor, id, &self.did) || id == &self.did)
    }

    /// The farthest finger strictly between the node and `id`, the node itself if none.
    pub fn closest_preceding_finger(&self, id: &Did) -> Result<Did> {
        Ok(self.lock_finger()?.closest_preceding(id))
    }

    /// Handle notification from a node that thinks it is the predecessor of current node.
    /// It is accepted if no predecessor is known or if it is closer than the current one,
    /// so a stale notification never regresses the predecessor.
    pub fn notify(&self, did: Did) -> Result<()> {
        let mut predecessor = self.lock_predecessor()?;
        if *predecessor == self.did || in_range(&predecessor, &did, &self.did) {
            if *predecessor != did {
                tracing::debug!("{} accepts predecessor {}", self.did, did);
            }
            *predecessor = did;
        }
        Ok(())
    }

    /// Forget a node whose link was lost. The next backup is promoted wherever `did`
    /// was referenced, and every finger slot holding `did` is remapped to it.
    pub fn remove(&self, did: &Did) -> Result<()> {
        if did == &self.did {
            return Ok(());
        }
        let mut finger = self.lock_finger()?;
        let mut predecessor = self.lock_predecessor()?;
        let mut succ_backups = self.lock_succ_backups()?;
        let mut pred_backups = self.lock_pred_backups()?;

        let mut promoted = vec![];
        if &*predecessor == did {
            let next = pred_backups.shift().unwrap_or_else(|| self.did.clone());
            *predecessor = next.clone();
            promoted.push(next);
        }
        if finger.successor() == did {
            let next = succ_backups.shift().unwrap_or_else(|| self.did.clone());
            finger.set_successor(next.clone());
            promoted.push(next);
        } else if let Some(Some(next)) = succ_backups.next_of(did) {
            promoted.push(next);
        }
        // first live replacement wins, self only when nothing else is left
        let target = promoted
            .into_iter()
            .find(|id| id != &self.did)
            .unwrap_or_else(|| self.did.clone());

        succ_backups.remove(did);
        pred_backups.remove(did);
        finger.replace(did, &target);
        tracing::debug!("{} removed {}, promoted {}", self.did, did, target);
        Ok(())
    }

    /// Answer a query as this node.
    pub fn handle_query<'a>(
        &'a self,
        query: Query,
        rpc: &'a dyn RingRpc,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            match query {
                Query::Id => to_ret(&self.did),
                Query::SuccessorId => to_ret(&self.successor()?),
                Query::PredecessorId => to_ret(&self.predecessor()?),
                Query::SuccWithBackupIds => to_ret(&self.successor_list()?),
                Query::PredWithBackupIds => to_ret(&self.predecessor_list()?),
                Query::Notify(did) => {
                    self.notify(did)?;
                    Ok(Value::Null)
                }
                Query::Keys => to_ret(&self.local_keys().await?),
                Query::Get(key) => Ok(self.local_get(&key).await?.unwrap_or(Value::Null)),
                Query::Hash(key) => to_ret(&self.local_hash(&key).await?),
                Query::Put(PutArg { key, value }) => {
                    self.local_put(&key, value).await?;
                    Ok(Value::Null)
                }
                Query::Subscribe(SubscribeArg { key, id }) => {
                    to_ret(&self.local_subscribe(&key, id).await?)
                }
                Query::Unsubscribe(SubscribeArg { key, id }) => {
                    to_ret(&self.local_unsubscribe(&key, &id).await?)
                }
                Query::RecQuery { id, query, ttl } => self.rec_query(id, *query, Some(ttl), rpc).await,
                Query::FindSuccessorId(id) => self.rec_query(id, Query::Id, None, rpc).await,
                Query::FindPredecessorId(id) => {
                    self.rec_query(id, Query::PredecessorId, None, rpc).await
                }
            }
        }
        .boxed()
    }

    /// Route `query` to the node responsible for `id` and return its answer.
    /// Each hop spends one unit of `ttl`, the lookup ttl when `None`.
    pub fn rec_query<'a>(
        &'a self,
        id: Did,
        query: Query,
        ttl: Option<u32>,
        rpc: &'a dyn RingRpc,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let ttl = ttl.unwrap_or(self.lookup_ttl);
            if ttl == 0 {
                tracing::warn!("{} drops {} for {}: ttl exceeded", self.did, query.method(), id);
                return Err(Error::TtlExceeded);
            }
            let ttl = ttl - 1;
            if self.is_responsible_for(&id)? {
                return self.handle_query(query, rpc).await;
            }
            let next = self.closest_preceding_finger(&id)?;
            if next == self.did {
                let successor = self.successor()?;
                tracing::debug!("{} asks successor {} for {}", self.did, successor, id);
                rpc.query(&successor, query).await
            } else {
                tracing::debug!("{} routes {} via {}, ttl {}", self.did, id, next, ttl);
                rpc.query(&next, Query::RecQuery {
                    id,
                    query: Box::new(query),
                    ttl,
                })
                .await
            }
        }
        .boxed()
    }

    /// The node responsible for `id`.
    pub async fn find_successor(&self, id: &Did, rpc: &dyn RingRpc) -> Result<Did> {
        from_ret(self.rec_query(id.clone(), Query::Id, None, rpc).await?)
    }

    /// The predecessor of the node responsible for `id`.
    pub async fn find_predecessor(&self, id: &Did, rpc: &dyn RingRpc) -> Result<Did> {
        from_ret(
            self.rec_query(id.clone(), Query::PredecessorId, None, rpc)
                .await?,
        )
    }

    /// Store `value` under the hash of `key` at the responsible node.
    pub async fn put<K>(&self, key: &K, value: Value, rpc: &dyn RingRpc) -> Result<()>
    where K: Serialize + ?Sized {
        let key = self.space.hash(key)?;
        self.rec_query(key.clone(), Query::Put(PutArg { key, value }), None, rpc)
            .await?;
        Ok(())
    }

    /// Read the value under the hash of `key` from the responsible node.
    pub async fn get<K>(&self, key: &K, rpc: &dyn RingRpc) -> Result<Option<Value>>
    where K: Serialize + ?Sized {
        let key = self.space.hash(key)?;
        let ret = self
            .rec_query(key.clone(), Query::Get(key), None, rpc)
            .await?;
        Ok(match ret {
            Value::Null => None,
            v => Some(v),
        })
    }

    /// Add or renew `id` in the subscribers of `channel`, returns the subscribers.
    pub async fn subscribe<K>(&self, channel: &K, id: Did, rpc: &dyn RingRpc) -> Result<Subscribers>
    where K: Serialize + ?Sized {
        let key = self.space.hash(channel)?;
        let query = Query::Subscribe(SubscribeArg {
            key: key.clone(),
            id,
        });
        from_ret(self.rec_query(key, query, None, rpc).await?)
    }

    /// Remove `id` from the subscribers of `channel`, returns the subscribers left.
    pub async fn unsubscribe<K>(
        &self,
        channel: &K,
        id: Did,
        rpc: &dyn RingRpc,
    ) -> Result<Subscribers>
    where
        K: Serialize + ?Sized,
    {
        let key = self.space.hash(channel)?;
        let query = Query::Unsubscribe(SubscribeArg {
            key: key.clone(),
            id,
        });
        from_ret(self.rec_query(key, query, None, rpc).await?)
    }

    /// Join the ring known by `bootstrap`.
    /// Nothing is assigned until every step succeeded, so a failed join leaves the
    /// node untouched and can be retried as a whole.
    pub async fn join(&self, bootstrap: &Did, rpc: &dyn RingRpc) -> Result<()> {
        if bootstrap == &self.did {
            return Err(Error::ShouldNotConnectSelf);
        }
        // Ask for the successor of self + 1, a node rejoining would find itself otherwise.
        let after_self = self.space.finger_start(&self.did, 0);
        let successor: Did =
            from_ret(rpc.query(bootstrap, Query::FindSuccessorId(after_self)).await?)?;
        let succ_backups: Vec<Did> = from_ret(rpc.query(&successor, Query::SuccWithBackupIds).await?)?;

        let predecessor = match self.discover_predecessor(bootstrap, rpc).await {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!("{} failed to discover predecessor: {}", self.did, e);
                None
            }
        };

        // fingers
        let size = self.finger_len()?;
        let starts: Vec<Did> = (1..size)
            .map(|i| self.space.finger_start(&self.did, i))
            .collect();
        let found: Vec<Did> = try_join_all(starts.into_iter().map(|start| async move {
            from_ret::<Did>(rpc.query(bootstrap, Query::FindSuccessorId(start)).await?)
        }))
        .await?;
        let mut fingers = Vec::with_capacity(size);
        fingers.push(successor.clone());
        fingers.extend(found);
        let mut touched: Vec<Did> = vec![];
        for id in fingers.iter() {
            if id != &self.did && !touched.contains(id) {
                touched.push(id.clone());
            }
        }
        try_join_all(touched.iter().map(|id| rpc.query(id, Query::Id))).await?;

        // keys now under our responsibility
        let keys: Vec<Did> = from_ret(rpc.query(&successor, Query::Keys).await?)?;
        let lower = predecessor.as_ref().map(|(p, _)| p.clone()).unwrap_or_else(|| self.did.clone());
        let keys: Vec<Did> = keys
            .into_iter()
            .filter(|k| in_range(&lower, k, &self.did) || k == &self.did)
            .collect();
        let values = try_join_all(keys.iter().map(|k| rpc.query(&successor, Query::Get(k.clone())))).await?;

        // more successors
        try_join_all(
            succ_backups
                .iter()
                .filter(|id| *id != &self.did)
                .take(self.config.succ_backup_concurrency)
                .map(|id| rpc.query(id, Query::Id)),
        )
        .await?;

        // ok to join
        {
            let mut finger = self.lock_finger()?;
            finger.assign(fingers);
        }
        self.lock_succ_backups()?.assign(succ_backups, &successor);
        if let Some((predecessor, pred_backups)) = predecessor {
            self.lock_pred_backups()?.assign(pred_backups, &predecessor);
            *self.lock_predecessor()? = predecessor;
        }
        for (key, value) in keys.iter().zip(values) {
            if !value.is_null() {
                self.local_put(key, value).await?;
            }
        }
        tracing::info!(
            "{} joined via {}, successor {}, {} keys transferred",
            self.did,
            bootstrap,
            successor,
            keys.len()
        );
        Ok(())
    }

    async fn discover_predecessor(
        &self,
        bootstrap: &Did,
        rpc: &dyn RingRpc,
    ) -> Result<(Did, Vec<Did>)> {
        let predecessor: Did =
            from_ret(rpc.query(bootstrap, Query::FindPredecessorId(self.did.clone())).await?)?;
        let backups: Vec<Did> =
            from_ret(rpc.query(&predecessor, Query::PredWithBackupIds).await?)?;
        Ok((predecessor, backups))
    }

    /// Verify the successor, adopt its predecessor if closer, refresh both backup
    /// lists and notify the successor.
    pub async fn stabilize(&self, rpc: &dyn RingRpc) -> Result<()> {
        let successor = self.successor()?;
        let pre: Did = from_ret(rpc.query(&successor, Query::PredecessorId).await?)?;
        if in_range(&self.did, &pre, &successor) && pre != self.did {
            tracing::debug!("{} adopts successor {}", self.did, pre);
            self.lock_finger()?.set_successor(pre);
        }

        let successor = self.successor()?;
        let succ_list: Vec<Did> = from_ret(rpc.query(&successor, Query::SuccWithBackupIds).await?)?;
        self.lock_succ_backups()?.assign(succ_list, &successor);

        let predecessor = self.predecessor()?;
        let pred_list: Vec<Did> =
            from_ret(rpc.query(&predecessor, Query::PredWithBackupIds).await?)?;
        self.lock_pred_backups()?.assign(pred_list, &predecessor);

        rpc.query(&successor, Query::Notify(self.did.clone())).await?;
        Ok(())
    }

    /// Recompute finger `index` and keep a live link to it.
    /// `index == len` appends a new slot.
    pub async fn fix_finger(&self, index: usize, rpc: &dyn RingRpc) -> Result<()> {
        let start = self.space.finger_start(&self.did, index);
        let found = self.find_successor(&start, rpc).await?;
        self.lock_finger()?.set(index, found.clone());
        if found != self.did {
            rpc.query(&found, Query::Id).await?;
        }
        Ok(())
    }

    /// Push `key` to `successor` if its copy differs from ours.
    pub async fn replicate(&self, successor: &Did, key: &Did, rpc: &dyn RingRpc) -> Result<()> {
        let remote: Option<Did> = from_ret(rpc.query(successor, Query::Hash(key.clone())).await?)?;
        let local = self.local_hash(key).await?;
        if remote != local {
            if let Some(value) = self.local_get(key).await? {
                tracing::debug!("{} replicates {} to {}", self.did, key, successor);
                rpc.query(successor, Query::Put(PutArg {
                    key: key.clone(),
                    value,
                }))
                .await?;
            }
        }
        Ok(())
    }

    /// One maintenance tick: refresh a window of fingers, sync one owned key to the
    /// first successors, stabilize and evict expired values. Every step runs even if
    /// another fails, the first failure is returned.
    pub async fn poll(&self, rpc: &dyn RingRpc) -> Result<()> {
        let window = self
            .lock_finger()?
            .next_fix_window(self.config.fix_finger_concurrency);
        let fixes = join_all(window.into_iter().map(|i| self.fix_finger(i, rpc)));

        let successors: Vec<Did> = self
            .successor_list()?
            .into_iter()
            .take(self.config.succ_backup_concurrency + 1)
            .collect();
        let mut owned = vec![];
        for key in self.local_keys().await? {
            if self.is_responsible_for(&key)? {
                owned.push(key);
            }
        }
        let key = owned.choose(&mut rand::thread_rng()).cloned();
        let syncs = join_all(successors.iter().map(|succ| {
            let key = key.clone();
            async move {
                match key {
                    Some(key) => self.replicate(succ, &key, rpc).await,
                    None => rpc.query(succ, Query::Id).await.map(|_| ()),
                }
            }
        }));

        let (fixes, syncs, stabilized) = futures::join!(fixes, syncs, self.stabilize(rpc));
        self.recycle_store().await?;

        let mut first = None;
        for e in fixes
            .into_iter()
            .chain(syncs)
            .chain(std::iter::once(stabilized))
            .filter_map(|r| r.err())
        {
            tracing::debug!("{} poll step failed: {}", self.did, e);
            first.get_or_insert(e);
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Keys of the local store.
    pub async fn local_keys(&self) -> Result<Vec<Did>> {
        self.storage.keys().await
    }

    /// Every entry of the local store, without touching them.
    pub async fn stored(&self) -> Result<Vec<(Did, StoredValue)>> {
        self.storage.get_all().await
    }

    /// Read a local value and mark it touched.
    pub async fn local_get(&self, key: &Did) -> Result<Option<Value>> {
        Ok(self.touch(key).await?.map(|v| v.value))
    }

    /// Content hash of a local value, marking it touched.
    pub async fn local_hash(&self, key: &Did) -> Result<Option<Did>> {
        Ok(self.touch(key).await?.map(|v| v.hash))
    }

    async fn touch(&self, key: &Did) -> Result<Option<StoredValue>> {
        let Some(mut stored) = self.storage.get(key).await? else {
            return Ok(None);
        };
        stored.touched = get_epoch_ms();
        self.storage.put(key, &stored).await?;
        Ok(Some(stored))
    }

    /// Write a local value.
    pub async fn local_put(&self, key: &Did, value: Value) -> Result<()> {
        let hash = self.space.hash(&value)?;
        let stored = StoredValue {
            value,
            hash,
            touched: get_epoch_ms(),
        };
        self.storage.put(key, &stored).await
    }

    /// Merge `id` into the local subscriber set under `key`, dropping expired entries.
    pub async fn local_subscribe(&self, key: &Did, id: Did) -> Result<Subscribers> {
        let now = get_epoch_ms();
        let expiration = now.saturating_sub(self.config.subscription_expiration);
        let mut subscribers: Subscribers = self.local_subscribers(key).await?;
        subscribers.retain(|_, renewed| *renewed > expiration);
        subscribers.insert(id, now);
        self.local_put(key, to_ret(&subscribers)?).await?;
        Ok(subscribers)
    }

    /// Drop `id` from the local subscriber set under `key`.
    pub async fn local_unsubscribe(&self, key: &Did, id: &Did) -> Result<Subscribers> {
        let mut subscribers: Subscribers = self.local_subscribers(key).await?;
        subscribers.remove(id);
        self.local_put(key, to_ret(&subscribers)?).await?;
        Ok(subscribers)
    }

    async fn local_subscribers(&self, key: &Did) -> Result<Subscribers> {
        Ok(match self.local_get(key).await? {
            Some(v) => serde_json::from_value(v).unwrap_or_default(),
            None => Subscribers::new(),
        })
    }

    /// Evict values untouched for longer than the store recycle timeout.
    pub async fn recycle_store(&self) -> Result<()> {
        let expired_before = get_epoch_ms().saturating_sub(self.config.store_recycle_timeout);
        for (key, stored) in self.storage.get_all().await? {
            if stored.touched <= expired_before {
                tracing::debug!("{} recycles {}", self.did, key);
                self.storage.remove(&key).await?;
            }
        }
        Ok(())
    }
}

fn to_ret<T: Serialize + ?Sized>(v: &T) -> Result<Value> {
    serde_json::to_value(v).map_err(Error::Serialize)
}
