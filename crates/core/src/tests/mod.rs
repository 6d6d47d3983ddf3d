use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chordmesh_transport::connections::MemoryNetwork;
use chordmesh_transport::Transport;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::dht::Did;
use crate::hub::Hub;
use crate::logging::LogLevel;
use crate::message::CustomMessage;
use crate::swarm::Bootstrap;
use crate::swarm::Swarm;
use crate::swarm::SwarmBuilder;
use crate::swarm::SwarmCallback;
use crate::swarm::SwarmEvent;

pub mod default;

#[allow(dead_code)]
pub fn setup_tracing() {
    crate::logging::init_logging(LogLevel::Debug)
}

pub fn did(n: u32) -> Did {
    Did::from(n)
}

pub async fn manually_establish_connection(hub1: &Hub, hub2: &Hub) {
    hub1.connect_local(hub2).await.unwrap();
    assert!(hub1.has(hub2.did()));
    assert!(hub2.has(hub1.did()));
}

/// An 8 bit ring with short deadlines. The maintenance loop is started but never
/// ticks by itself, tests drive it with [stabilize_all].
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.id.bits = 8;
    config.node.finger_table_size = 8;
    config.node.succ_list_size = 4;
    config.hub.peer_call_timeout = 2000;
    config.hub.peer_connect_timeout = 2000;
    config.hub.failed_connect_backoff = 100;
    config.swarm.stabilize_interval = 3_600_000;
    config.swarm.signal_timeout = 1000;
    config.swarm.wait_event_timeout = 500;
    config.swarm.max_join_retry = 2;
    config.swarm.join_retry_backoff = 10;
    config
}

pub fn prepare_swarm_with(n: u32, network: &MemoryNetwork, config: Config) -> Arc<Swarm> {
    let swarm = SwarmBuilder::new(Transport::new(network.clone()))
        .config(config)
        .did(did(n))
        .build()
        .unwrap();
    println!("did: {}", swarm.did());
    swarm
}

pub fn prepare_swarm(n: u32, network: &MemoryNetwork) -> Arc<Swarm> {
    prepare_swarm_with(n, network, test_config())
}

/// A swarm with its inbound messages and events.
pub struct Node {
    pub swarm: Arc<Swarm>,
    message_rx: mpsc::UnboundedReceiver<CustomMessage>,
    event_rx: mpsc::UnboundedReceiver<SwarmEvent>,
}

pub struct NodeCallback {
    message_tx: mpsc::UnboundedSender<CustomMessage>,
    event_tx: mpsc::UnboundedSender<SwarmEvent>,
}

impl Node {
    pub fn new(swarm: Arc<Swarm>) -> Self {
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let callback = NodeCallback {
            message_tx,
            event_tx,
        };
        swarm.set_callback(Arc::new(callback)).unwrap();
        Self {
            swarm,
            message_rx,
            event_rx,
        }
    }

    pub fn did(&self) -> &Did {
        self.swarm.did()
    }

    /// Next message, failing the test if none arrives soon.
    pub async fn listen_once(&mut self) -> CustomMessage {
        tokio::time::timeout(Duration::from_secs(3), self.message_rx.recv())
            .await
            .expect("no message arrived")
            .unwrap()
    }

    /// Assert nothing arrives for a while.
    pub async fn assert_no_message(&mut self) {
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(self.message_rx.try_recv().is_err());
    }

    /// Next event matching `pred`, skipping the others.
    pub async fn wait_event(&mut self, pred: impl Fn(&SwarmEvent) -> bool) -> SwarmEvent {
        tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let ev = self.event_rx.recv().await.unwrap();
                if pred(&ev) {
                    return ev;
                }
            }
        })
        .await
        .expect("no matching event arrived")
    }
}

#[async_trait]
impl SwarmCallback for NodeCallback {
    async fn on_message(
        &self,
        msg: &CustomMessage,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.message_tx.send(msg.clone()).map_err(|e| e.into())
    }

    async fn on_event(
        &self,
        event: &SwarmEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.event_tx.send(event.clone()).map_err(|e| e.into())
    }
}

/// Run `rounds` maintenance ticks on every live node, one node at a time.
pub async fn stabilize_all(nodes: &[Node], rounds: usize) {
    for _ in 0..rounds {
        for node in nodes.iter().filter(|n| n.swarm.is_started()) {
            if let Err(e) = node.swarm.tick().await {
                println!("{} tick failed: {}", node.did(), e);
            }
        }
    }
}

/// Start the nodes `ids` one by one, each joining through the first.
pub async fn prepare_ring(network: &MemoryNetwork, ids: &[u32]) -> Vec<Node> {
    let mut nodes: Vec<Node> = vec![];
    for id in ids {
        let swarm = prepare_swarm(*id, network);
        let bootstrap = nodes.first().map(|n| Bootstrap::Local(n.swarm.clone()));
        swarm.start(bootstrap).await.unwrap();
        nodes.push(Node::new(swarm));
        stabilize_all(&nodes, 3).await;
    }
    stabilize_all(&nodes, 5).await;
    nodes
}
