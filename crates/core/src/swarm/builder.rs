#![warn(missing_docs)]
//! This module provider [SwarmBuilder] and it's interface for
//! [Swarm]

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::Weak;

use chordmesh_transport::Transport;
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;

use crate::config::Config;
use crate::dht::Did;
use crate::dht::RingNode;
use crate::error::Error;
use crate::error::Result;
use crate::hub::Hub;
use crate::hub::HubDelegate;
use crate::swarm::callback::DefaultCallback;
use crate::swarm::callback::SharedSwarmCallback;
use crate::swarm::signal::SignalBoard;
use crate::swarm::Swarm;

/// Creates a SwarmBuilder to configure a Swarm.
pub struct SwarmBuilder {
    transport: Transport,
    config: Config,
    callback: Option<SharedSwarmCallback>,
    error_sender: Option<UnboundedSender<Error>>,
}

impl SwarmBuilder {
    /// Creates new instance of [SwarmBuilder], links are created with `transport`.
    pub fn new(transport: Transport) -> Self {
        SwarmBuilder {
            transport,
            config: Config::default(),
            callback: None,
            error_sender: None,
        }
    }

    /// Replace the whole config.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets up the did of the node instead of a random one.
    pub fn did(mut self, did: Did) -> Self {
        self.config.id.id = Some(did);
        self
    }

    /// Bind callback for Swarm.
    pub fn callback(mut self, callback: SharedSwarmCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Receive the failures of maintenance ticks.
    pub fn error_sender(mut self, sender: UnboundedSender<Error>) -> Self {
        self.error_sender = Some(sender);
        self
    }

    /// Try build for `Swarm`.
    pub fn build(self) -> Result<Arc<Swarm>> {
        self.config.validate()?;
        let space = self.config.id_space()?;
        let did = self
            .config
            .id
            .id
            .clone()
            .unwrap_or_else(|| space.random());

        let node = RingNode::new(did.clone(), space, self.config.node.clone());
        let hub = Hub::new(did.clone(), self.transport, self.config.hub.clone());
        let callback = RwLock::new(
            self.callback
                .unwrap_or_else(|| Arc::new(DefaultCallback {})),
        );

        let swarm = Arc::new_cyclic(|this| Swarm {
            did,
            config: self.config,
            node,
            hub,
            signals: SignalBoard::default(),
            node_states: Mutex::new(VecDeque::new()),
            subscriptions: DashMap::new(),
            callback,
            error_sender: self.error_sender,
            started: AtomicBool::new(false),
            polling: AtomicBool::new(false),
            stop_notify: Notify::new(),
            this: this.clone(),
        });
        let delegate: Weak<dyn HubDelegate> = Arc::downgrade(&swarm) as Weak<dyn HubDelegate>;
        swarm.hub.set_delegate(delegate)?;
        tracing::debug!("built swarm {}", swarm.did);
        Ok(swarm)
    }
}
