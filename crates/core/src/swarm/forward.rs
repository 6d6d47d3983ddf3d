//! Multi-target relay and inbound event dispatch.

use std::collections::BTreeMap;

use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::Event;
use crate::message::ForwardPayload;
use crate::message::SignalSdp;
use crate::message::SignalToken;
use crate::swarm::signal::SignalKind;
use crate::swarm::Swarm;
use crate::swarm::SwarmEvent;

/// Where one hop of a forward sends its targets.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ForwardPlan {
    /// This node is a target.
    pub local: bool,
    /// Targets with a registered link.
    pub direct: Vec<Did>,
    /// Remaining targets, keyed by the finger they are relayed through.
    pub routes: BTreeMap<Did, Vec<Did>>,
    /// Targets no finger precedes.
    pub unroutable: Vec<Did>,
}

impl Swarm {
    /// Split `targets` by next hop, dropping duplicates.
    pub(crate) fn plan_forward(&self, targets: Vec<Did>) -> Result<ForwardPlan> {
        let mut plan = ForwardPlan::default();
        for target in targets {
            if target == self.did {
                plan.local = true;
            } else if self.hub.has(&target) {
                if !plan.direct.contains(&target) {
                    plan.direct.push(target);
                }
            } else {
                let next = self.node.closest_preceding_finger(&target)?;
                if next == self.did {
                    plan.unroutable.push(target);
                } else {
                    let batch = plan.routes.entry(next).or_default();
                    if !batch.contains(&target) {
                        batch.push(target);
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Deliver `event` to every node of `targets` within `ttl` hops.
    ///
    /// Spends one hop here. Self is handled in place, linked targets get the event
    /// directly, the others are batched per next hop into one [Event::Forward]
    /// each. Nothing is relayed further once the budget is spent.
    pub fn forward<'a>(
        &'a self,
        targets: Vec<Did>,
        event: Event,
        ttl: u32,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if ttl == 0 {
                tracing::warn!(
                    "{} drops {} to {} targets: ttl exceeded",
                    self.did,
                    event.name(),
                    targets.len()
                );
                return Ok(());
            }
            let ttl = ttl - 1;

            let ForwardPlan {
                local,
                direct,
                mut routes,
                unroutable,
            } = self.plan_forward(targets)?;
            if ttl == 0 && !routes.is_empty() {
                tracing::warn!(
                    "{} drops {} to {} next hops: ttl exceeded",
                    self.did,
                    event.name(),
                    routes.len()
                );
                routes.clear();
            }

            let mut first: Option<Error> = None;
            if local {
                if let Err(e) = self.handle_event(&self.did, event.clone()).await {
                    tracing::warn!("{} failed to handle {}: {}", self.did, event.name(), e);
                    first.get_or_insert(e);
                }
            }

            let sends = direct
                .into_iter()
                .map(|target| (target, event.clone()))
                .chain(routes.into_iter().map(|(next, targets)| {
                    tracing::debug!(
                        "{} forwards {} to {:?} via {}, ttl {}",
                        self.did,
                        event.name(),
                        targets,
                        next,
                        ttl
                    );
                    let payload = ForwardPayload {
                        targets,
                        event: Box::new(event.clone()),
                        ttl,
                    };
                    (next, Event::Forward(payload))
                }))
                .map(|(to, ev)| async move {
                    let sent = self.hub.send(&to, ev).await;
                    (to, sent)
                });
            for (to, sent) in join_all(sends).await {
                if let Err(e) = sent {
                    tracing::warn!("{} failed to send {} to {}: {}", self.did, event.name(), to, e);
                    if e.is_link_failure() {
                        self.forget(&to).await;
                    }
                    first.get_or_insert(e);
                }
            }

            if let Some(target) = unroutable.into_iter().next() {
                tracing::warn!("{} has no route to {}", self.did, target);
                return Err(Error::NoRoute(target));
            }
            match first {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
        .boxed()
    }

    /// Handle an event addressed to this node.
    pub(crate) async fn handle_event(&self, from: &Did, event: Event) -> Result<()> {
        tracing::debug!("{} got {} from {}", self.did, event.name(), from);
        match event {
            Event::Forward(ForwardPayload { targets, event, ttl }) => {
                self.forward(targets, *event, ttl).await
            }
            Event::SignalStart(start) => {
                if let Some(this) = self.this.upgrade() {
                    tokio::spawn(async move {
                        let (initiator, proxy) = (start.id.clone(), start.proxy.clone());
                        if let Err(e) = this.accept_via_proxy(start).await {
                            tracing::warn!(
                                "{} failed to accept {} via {}: {}",
                                this.did,
                                initiator,
                                proxy,
                                e
                            );
                        }
                    });
                }
                Ok(())
            }
            Event::SignalReady(SignalToken { token }) => {
                self.deliver_signal(SignalKind::Ready, &token, String::new());
                Ok(())
            }
            Event::SignalOffer(SignalSdp { token, sdp }) => {
                self.deliver_signal(SignalKind::Offer, &token, sdp);
                Ok(())
            }
            Event::SignalAnswer(SignalSdp { token, sdp }) => {
                self.deliver_signal(SignalKind::Answer, &token, sdp);
                Ok(())
            }
            Event::SubscriptionUpdate(update) => {
                self.subscriptions
                    .insert(update.channel.clone(), update.subscribers.clone());
                self.emit(SwarmEvent::SubscriptionUpdate {
                    channel: update.channel,
                    subscribers: update.subscribers,
                })
                .await;
                Ok(())
            }
            Event::Ping => {
                self.emit(SwarmEvent::Ping).await;
                Ok(())
            }
            Event::Message(msg) => self.deliver_message(&msg).await,
        }
    }

    fn deliver_signal(&self, kind: SignalKind, token: &str, sdp: String) {
        if !self.signals.deliver(kind, token, sdp) {
            tracing::debug!("{} dropped unexpected {:?} of {}", self.did, kind, token);
        }
    }
}

#[cfg(test)]
mod tests {
    use chordmesh_transport::connections::MemoryNetwork;

    use super::*;
    use crate::tests::did;
    use crate::tests::prepare_ring;

    #[tokio::test]
    async fn test_plan_batches_per_next_hop() {
        let network = MemoryNetwork::new();
        let nodes = prepare_ring(&network, &[10, 60, 120, 150, 180, 240]).await;
        let sender = nodes[0].swarm.clone();
        sender.hub().remove(&did(180)).await;
        sender.hub().remove(&did(240)).await;
        assert_eq!(sender.node().closest_preceding_finger(&did(180)).unwrap(), did(150));
        assert_eq!(sender.node().closest_preceding_finger(&did(240)).unwrap(), did(150));

        let plan = sender
            .plan_forward(vec![did(10), did(60), did(180), did(240), did(180), did(60)])
            .unwrap();
        println!("{:?}", plan);
        assert!(plan.local);
        assert_eq!(plan.direct, vec![did(60)]);
        assert_eq!(plan.routes.len(), 1);
        assert_eq!(plan.routes[&did(150)], vec![did(180), did(240)]);
        assert!(plan.unroutable.is_empty());
    }
}
