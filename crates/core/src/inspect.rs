//! Serializable snapshots of a running swarm.

use serde::Deserialize;
use serde::Serialize;

use crate::dht::RingNode;
use crate::swarm::Swarm;

/// Everything a swarm knows about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmInspect {
    /// Whether the swarm is running.
    pub started: bool,
    /// Registered links, ordered by peer id.
    pub connections: Vec<ConnectionInspect>,
    /// Routing state of the ring node.
    pub ring: RingInspect,
    /// Records stored locally.
    pub storage: StorageInspect,
}

/// One registered link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInspect {
    /// Peer at the other end.
    pub did: String,
    /// Connection state, as debug formatted.
    pub state: String,
    /// Registration time, epoch ms.
    pub created: u64,
    /// Last send or receive, epoch ms.
    pub last_active: u64,
}

/// Routing state of a ring node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingInspect {
    /// Id of the node.
    pub did: String,
    /// Successor followed by its backups.
    pub successors: Vec<String>,
    /// Predecessor followed by its backups.
    pub predecessors: Vec<String>,
    /// Finger table, run-length encoded by [compress_iter].
    pub finger_table: Vec<(String, u64, u64)>,
}

/// Locally stored records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInspect {
    /// Key and value of each record.
    pub items: Vec<(String, serde_json::Value)>,
}

impl SwarmInspect {
    /// Snapshot `swarm`.
    pub async fn inspect(swarm: &Swarm) -> Self {
        let ring = RingInspect::inspect(swarm.node());
        let connections = {
            let hub = swarm.hub();
            let mut connections: Vec<ConnectionInspect> = hub
                .dids()
                .into_iter()
                .filter_map(|did| hub.link(&did).map(|l| (did, l)))
                .map(|(did, link)| ConnectionInspect {
                    did: did.to_string(),
                    state: format!("{:?}", link.state()),
                    created: link.created(),
                    last_active: link.last_active(),
                })
                .collect();
            connections.sort_by(|a, b| a.did.cmp(&b.did));
            connections
        };
        let storage = StorageInspect::inspect(swarm.node()).await;

        Self {
            started: swarm.is_started(),
            connections,
            ring,
            storage,
        }
    }
}

impl RingInspect {
    /// Snapshot the routing state of `node`.
    pub fn inspect(node: &RingNode) -> Self {
        let did = node.did().to_string();
        let successors = node
            .successor_list()
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let predecessors = node
            .predecessor_list()
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let finger_table = node
            .fingers()
            .map(|fingers| compress_iter(fingers.into_iter().map(|did| did.to_string())))
            .unwrap_or_default();

        Self {
            did,
            successors,
            predecessors,
            finger_table,
        }
    }
}

impl StorageInspect {
    /// Snapshot the records of `node`.
    pub async fn inspect(node: &RingNode) -> Self {
        Self {
            items: node
                .stored()
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|(key, stored)| (key.to_string(), stored.value))
                .collect(),
        }
    }
}

/// Run-length encode `iter` into `(item, first index, last index)`.
pub fn compress_iter<T>(iter: impl Iterator<Item = T>) -> Vec<(T, u64, u64)>
where T: PartialEq {
    let mut result = vec![];
    let mut start = 0u64;
    let mut count = 0u64;
    let mut prev: Option<T> = None;

    for (i, x) in iter.enumerate() {
        match prev {
            Some(p) if p == x => {
                prev = Some(p);
                count += 1;
                continue;
            }
            Some(p) => result.push((p, start, start + count - 1)),
            None => {}
        }
        start = i as u64;
        count = 1;
        prev = Some(x);
    }

    if let Some(p) = prev {
        result.push((p, start, start + count - 1));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_iter() {
        let fingers = vec!["0x3c", "0x3c", "0x78", "0x78", "0x78", "0xb4", "0xa"];
        assert_eq!(
            vec![("0x3c", 0, 1), ("0x78", 2, 4), ("0xb4", 5, 5), ("0xa", 6, 6)],
            compress_iter(fingers.into_iter())
        );
        assert!(compress_iter(Vec::<u8>::new().into_iter()).is_empty());
    }
}
