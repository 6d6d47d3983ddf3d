//! Channels on top of the ring store.
//!
//! The subscribers of a channel live at the node responsible for the hash of the
//! channel name. Subscribers keep a copy, refreshed by the updates pushed on
//! every change.

use serde_json::Value;

use crate::dht::Did;
use crate::error::Result;
use crate::message::from_ret;
use crate::message::CustomMessage;
use crate::message::Event;
use crate::message::Subscribers;
use crate::message::SubscriptionUpdate;
use crate::swarm::Swarm;
use crate::utils::get_epoch_ms;

impl Swarm {
    /// Subscribe self to `channel` and tell the other subscribers.
    pub async fn subscribe(&self, channel: &str) -> Result<()> {
        let key = self.node.space().hash(channel)?;
        let subscribers = self
            .node
            .subscribe(channel, self.did.clone(), self)
            .await?;
        tracing::debug!("{} subscribed {}, {} subscribers", self.did, channel, subscribers.len());
        self.subscriptions.insert(key.clone(), subscribers.clone());
        self.push_subscribers(key, subscribers).await
    }

    /// Remove self from `channel` and tell the other subscribers.
    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        let key = self.node.space().hash(channel)?;
        let subscribers = self
            .node
            .unsubscribe(channel, self.did.clone(), self)
            .await?;
        self.subscriptions.remove(&key);
        self.push_subscribers(key, subscribers).await
    }

    /// Send an application message to the live subscribers of `channel`, except self.
    pub async fn publish(&self, channel: &str, name: &str, data: Value) -> Result<()> {
        let key = self.node.space().hash(channel)?;
        let cached = self.subscriptions.get(&key).map(|s| s.value().clone());
        let subscribers = match cached {
            Some(subscribers) => subscribers,
            None => match self.node.get(channel, self).await? {
                Some(v) => from_ret(v)?,
                None => Subscribers::new(),
            },
        };
        let targets = self.live_subscribers(&subscribers);
        if targets.is_empty() {
            tracing::debug!("{} publishes {} to nobody", self.did, channel);
            return Ok(());
        }
        let event = Event::Message(CustomMessage {
            from: self.did.clone(),
            name: name.to_string(),
            data,
        });
        self.forward(targets, event, self.config.swarm.forward_ttl)
            .await
    }

    /// Subscribers of a subscribed channel as last seen by this node.
    pub fn subscribers(&self, channel: &str) -> Result<Option<Subscribers>> {
        let key = self.node.space().hash(channel)?;
        Ok(self.subscriptions.get(&key).map(|s| s.value().clone()))
    }

    fn live_subscribers(&self, subscribers: &Subscribers) -> Vec<Did> {
        let expired_before =
            get_epoch_ms().saturating_sub(self.config.node.subscription_expiration);
        subscribers
            .iter()
            .filter(|(id, renewed)| **renewed > expired_before && *id != &self.did)
            .map(|(id, _)| id.clone())
            .collect()
    }

    async fn push_subscribers(&self, channel: Did, subscribers: Subscribers) -> Result<()> {
        let targets = self.live_subscribers(&subscribers);
        if targets.is_empty() {
            return Ok(());
        }
        let event = Event::SubscriptionUpdate(SubscriptionUpdate {
            channel,
            subscribers,
        });
        self.forward(targets, event, self.config.swarm.forward_ttl)
            .await
    }
}
