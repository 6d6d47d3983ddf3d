//! Introduction of new links through existing ones.
//!
//! The initiator picks the linked peer with the oldest activity as proxy and
//! relays every handshake step through it:
//!
//! ```text
//! initiator --signal-start--> proxy --> target
//! initiator <--signal-ready-- proxy <-- target
//! initiator --signal-offer--> proxy --> target
//! initiator <--signal-answer- proxy <-- target
//! ```
//!
//! Steps are correlated by a single use token and each wait has its own deadline.

use chordmesh_transport::core::transport::ConnectionInterface;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;
use crate::message::Event;
use crate::message::ForwardPayload;
use crate::message::SignalSdp;
use crate::message::SignalStart;
use crate::message::SignalToken;
use crate::swarm::signal::SignalKind;
use crate::swarm::Swarm;
use crate::swarm::SwarmEvent;
use crate::utils::get_epoch_ms;

impl Swarm {
    /// Connect a given Did. If the did is already connected, return directly,
    /// else ask the link with the oldest activity to introduce it.
    pub async fn connect(&self, did: &Did) -> Result<()> {
        if did == &self.did {
            return Err(Error::ShouldNotConnectSelf);
        }
        if self.hub.has(did) {
            return Ok(());
        }
        let proxy = self
            .hub
            .oldest_link(did)
            .ok_or_else(|| Error::NoIntroducer(did.clone()))?;
        let token = format!(
            "{}>{}@{}#{}",
            did,
            proxy,
            get_epoch_ms(),
            rand::random::<u64>()
        );
        self.connect_via_proxy(did, &proxy, &token).await
    }

    async fn connect_via_proxy(&self, did: &Did, proxy: &Did, token: &str) -> Result<()> {
        let ready = self.signals.expect(SignalKind::Ready, token);
        self.send_via(
            proxy,
            did,
            Event::SignalStart(SignalStart {
                id: self.did.clone(),
                proxy: proxy.clone(),
                token: token.to_string(),
            }),
        )
        .await?;
        ready
            .wait(self.config.swarm.wait_event_timeout, did)
            .await?;

        tracing::debug!("{} connecting to {} via {}", self.did, did, proxy);
        let conn = self.hub.new_connection(did).await?;
        let handshake = async {
            let offer = conn.create_offer().await?;
            let answer = self.signals.expect(SignalKind::Answer, token);
            self.send_via(
                proxy,
                did,
                Event::SignalOffer(SignalSdp {
                    token: token.to_string(),
                    sdp: offer,
                }),
            )
            .await?;
            let answer = answer.wait(self.config.swarm.signal_timeout, did).await?;
            conn.accept_answer(answer).await?;
            conn.wait_for_data_channel_open().await?;
            Ok::<(), Error>(())
        };
        if let Err(e) = handshake.await {
            let _ = conn.close().await;
            return Err(e);
        }
        self.hub.add(did, conn).await?;
        self.emit(SwarmEvent::PeerConnected { peer: did.clone() })
            .await;
        Ok(())
    }

    pub(crate) async fn accept_via_proxy(&self, start: SignalStart) -> Result<()> {
        let SignalStart { id, proxy, token } = start;
        if id == self.did {
            return Err(Error::ShouldNotConnectSelf);
        }
        let offer = self.signals.expect(SignalKind::Offer, &token);
        self.send_via(
            &proxy,
            &id,
            Event::SignalReady(SignalToken {
                token: token.clone(),
            }),
        )
        .await?;

        tracing::debug!("{} accepting {} via {}", self.did, id, proxy);
        let offer = offer.wait(self.config.swarm.signal_timeout, &id).await?;
        let conn = self.hub.new_connection(&id).await?;
        let handshake = async {
            let answer = conn.answer_offer(offer).await?;
            self.send_via(
                &proxy,
                &id,
                Event::SignalAnswer(SignalSdp {
                    token: token.clone(),
                    sdp: answer,
                }),
            )
            .await?;
            conn.wait_for_data_channel_open().await?;
            Ok::<(), Error>(())
        };
        if let Err(e) = handshake.await {
            let _ = conn.close().await;
            return Err(e);
        }
        self.hub.add(&id, conn).await?;
        self.emit(SwarmEvent::PeerConnected { peer: id }).await;
        Ok(())
    }

    /// Link to a swarm of the same process without any introducer.
    /// Returns the did of `other`.
    pub async fn connect_local(&self, other: &Swarm) -> Result<Did> {
        self.hub.connect_local(&other.hub).await?;
        other
            .emit(SwarmEvent::PeerConnected {
                peer: self.did.clone(),
            })
            .await;
        self.emit(SwarmEvent::PeerConnected {
            peer: other.did.clone(),
        })
        .await;
        Ok(other.did.clone())
    }

    /// Have `proxy` relay `event` to `target`.
    pub async fn send_via(&self, proxy: &Did, target: &Did, event: Event) -> Result<()> {
        let ttl = self.config.swarm.forward_ttl;
        let relay = Event::Forward(ForwardPayload {
            targets: vec![target.clone()],
            event: Box::new(event),
            ttl,
        });
        self.forward(vec![proxy.clone()], relay, ttl).await
    }

    /// Send a ping that `did` bounces back here.
    pub async fn ping(&self, did: &Did) -> Result<()> {
        self.send_via(did, &self.did, Event::Ping).await
    }
}
