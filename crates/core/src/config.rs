//! Configuration of a swarm.
//!
//! Every section defaults from the constants of [crate::consts], so a YAML file only
//! needs the fields it overrides. Durations are milliseconds.

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::*;
use crate::dht::Did;
use crate::dht::IdSpace;
use crate::error::Error;
use crate::error::Result;

/// Identifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IdConfig {
    /// Width of the id space in bits, within `1..=160`.
    pub bits: u32,
    /// Fixed node id, random when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Did>,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            bits: DEFAULT_ID_BITS,
            id: None,
        }
    }
}

/// Ring node settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Hop ceiling of lookups, the id width when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_ttl: Option<u32>,
    /// Initial and largest finger table size.
    pub finger_table_size: usize,
    /// Bound of successor and predecessor lists.
    pub succ_list_size: usize,
    /// Fingers refreshed per tick.
    pub fix_finger_concurrency: usize,
    /// Successor backups synced per tick, besides the successor.
    pub succ_backup_concurrency: usize,
    /// Idle time after which a stored value is evicted.
    pub store_recycle_timeout: u64,
    /// Idle time after which a subscriber is dropped.
    pub subscription_expiration: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            lookup_ttl: None,
            finger_table_size: DEFAULT_FINGER_TABLE_SIZE,
            succ_list_size: DEFAULT_SUCC_LIST_SIZE,
            fix_finger_concurrency: DEFAULT_FIX_FINGER_CONCURRENCY,
            succ_backup_concurrency: DEFAULT_SUCC_BACKUP_CONCURRENCY,
            store_recycle_timeout: DEFAULT_STORE_RECYCLE_TIMEOUT,
            subscription_expiration: DEFAULT_SUBSCRIPTION_EXPIRATION,
        }
    }
}

/// Connection hub settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// Links never recycled below this count.
    pub min_conns_to_recycle: usize,
    /// Deadline of a correlated call.
    pub peer_call_timeout: u64,
    /// Deadline of a connection wait.
    pub peer_connect_timeout: u64,
    /// Idle time after which a link may be recycled.
    pub peer_recycle_timeout: u64,
    /// Refuse reconnecting a peer for this long after a failure.
    pub failed_connect_backoff: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            min_conns_to_recycle: DEFAULT_MIN_CONNS_TO_RECYCLE,
            peer_call_timeout: DEFAULT_PEER_CALL_TIMEOUT,
            peer_connect_timeout: DEFAULT_PEER_CONNECT_TIMEOUT,
            peer_recycle_timeout: DEFAULT_PEER_RECYCLE_TIMEOUT,
            failed_connect_backoff: DEFAULT_FAILED_CONNECT_BACKOFF,
        }
    }
}

/// Overlay settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Hop budget of sent messages.
    pub forward_ttl: u32,
    /// Pause between maintenance ticks.
    pub stabilize_interval: u64,
    /// Deadline of the offer and answer exchange.
    pub signal_timeout: u64,
    /// Deadline of the ready step of an introduction.
    pub wait_event_timeout: u64,
    /// Deadline of one maintenance tick.
    pub node_poll_timeout: u64,
    /// Join attempts.
    pub max_join_retry: usize,
    /// Pause between join attempts.
    pub join_retry_backoff: u64,
    /// Ticks of identical state before the ring counts as stable.
    pub node_state_check_length: usize,
    /// Grow fingers below this link count.
    pub min_hub_conn_count: usize,
    /// Shrink fingers above this link count.
    pub max_hub_conn_count: usize,
    /// Floor of adaptive finger sizing.
    pub min_node_finger_size: usize,
    /// Ceiling of adaptive finger sizing.
    pub max_node_finger_size: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            forward_ttl: DEFAULT_FORWARD_TTL,
            stabilize_interval: DEFAULT_STABILIZE_INTERVAL,
            signal_timeout: DEFAULT_SIGNAL_TIMEOUT,
            wait_event_timeout: DEFAULT_WAIT_EVENT_TIMEOUT,
            node_poll_timeout: DEFAULT_NODE_POLL_TIMEOUT,
            max_join_retry: DEFAULT_MAX_JOIN_RETRY,
            join_retry_backoff: DEFAULT_JOIN_RETRY_BACKOFF,
            node_state_check_length: DEFAULT_NODE_STATE_CHECK_LENGTH,
            min_hub_conn_count: DEFAULT_MIN_HUB_CONN_COUNT,
            max_hub_conn_count: DEFAULT_MAX_HUB_CONN_COUNT,
            min_node_finger_size: DEFAULT_MIN_NODE_FINGER_SIZE,
            max_node_finger_size: DEFAULT_MAX_NODE_FINGER_SIZE,
        }
    }
}

/// Full configuration of a swarm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Identifier settings.
    pub id: IdConfig,
    /// Ring node settings.
    pub node: NodeConfig,
    /// Hub settings.
    pub hub: HubConfig,
    /// Overlay settings.
    pub swarm: SwarmConfig,
}

impl Config {
    /// Load from a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn from_yaml_file<P>(path: P) -> Result<Self>
    where P: AsRef<Path> {
        tracing::debug!("Read config from: {:?}", path.as_ref());
        let f = fs::File::open(path)?;
        let config: Self = serde_yaml::from_reader(io::BufReader::new(f))?;
        config.validate()?;
        Ok(config)
    }

    /// Dump as a YAML document.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The id space described by [IdConfig::bits].
    pub fn id_space(&self) -> Result<IdSpace> {
        IdSpace::new(self.id.bits)
    }

    /// Check bit width and bounds.
    pub fn validate(&self) -> Result<()> {
        let space = self.id_space()?;
        if let Some(id) = &self.id.id {
            if id.as_biguint() >= &space.modulus() {
                return Err(Error::InvalidConfig(format!(
                    "id {id} does not fit in {} bits",
                    space.bits()
                )));
            }
        }
        if self.node.finger_table_size == 0 {
            return Err(Error::InvalidConfig(
                "finger_table_size must be positive".to_string(),
            ));
        }
        if self.node.lookup_ttl == Some(0) {
            return Err(Error::InvalidConfig(
                "lookup_ttl must be positive".to_string(),
            ));
        }
        if self.swarm.min_hub_conn_count > self.swarm.max_hub_conn_count {
            return Err(Error::InvalidConfig(
                "min_hub_conn_count exceeds max_hub_conn_count".to_string(),
            ));
        }
        if self.swarm.min_node_finger_size > self.swarm.max_node_finger_size
            || self.swarm.min_node_finger_size == 0
        {
            return Err(Error::InvalidConfig(
                "node finger size bounds are empty".to_string(),
            ));
        }
        if self.swarm.node_state_check_length == 0 {
            return Err(Error::InvalidConfig(
                "node_state_check_length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
