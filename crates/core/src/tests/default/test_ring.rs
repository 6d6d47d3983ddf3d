use serde_json::json;

use crate::dht::in_range;
use crate::dht::Did;
use crate::swarm::Bootstrap;
use crate::tests::did;
use crate::tests::prepare_ring;
use crate::tests::prepare_swarm;
use crate::tests::stabilize_all;
use crate::tests::Node;
use chordmesh_transport::connections::MemoryNetwork;

#[tokio::test]
async fn test_ring_consistency() {
    let network = MemoryNetwork::new();
    let nodes = prepare_ring(&network, &[10, 60, 120, 180, 240]).await;

    for node in nodes.iter() {
        let swarm = &node.swarm;
        println!("{:?}", swarm.inspect().await.ring);
        assert_eq!(swarm.find_successor(&did(200)).await.unwrap(), did(240));
        assert_eq!(swarm.find_predecessor(&did(200)).await.unwrap(), did(180));
        assert_eq!(swarm.find_successor(&did(5)).await.unwrap(), did(10));
        assert_eq!(swarm.find_successor(&did(250)).await.unwrap(), did(10));
    }

    let node = nodes[2].swarm.node();
    assert_eq!(node.successor().unwrap(), did(180));
    assert_eq!(node.predecessor().unwrap(), did(60));
    assert_eq!(node.succ_backups().unwrap()[0], did(240));
    assert_eq!(node.pred_backups().unwrap()[0], did(10));
}

#[tokio::test]
async fn test_two_nodes_after_one_round() {
    let network = MemoryNetwork::new();
    let first = prepare_swarm(10, &network);
    first.start(None).await.unwrap();
    let second = prepare_swarm(130, &network);
    second
        .start(Some(Bootstrap::Local(first.clone())))
        .await
        .unwrap();

    for swarm in [&second, &first] {
        if let Err(e) = swarm.tick().await {
            println!("{} tick failed: {}", swarm.did(), e);
        }
    }
    assert_eq!(first.node().successor().unwrap(), did(130));
    assert_eq!(first.node().predecessor().unwrap(), did(130));

    second.put("hello", json!("world")).await.unwrap();
    assert_eq!(first.get("hello").await.unwrap(), Some(json!("world")));
    assert_eq!(second.get("hello").await.unwrap(), Some(json!("world")));
}

#[tokio::test]
async fn test_partition() {
    let network = MemoryNetwork::new();
    let nodes = prepare_ring(&network, &[10, 60, 120, 180, 240]).await;

    for k in 0..256u32 {
        let owners: Vec<_> = nodes
            .iter()
            .filter(|n| n.swarm.node().is_responsible_for(&did(k)).unwrap())
            .map(|n| n.did().clone())
            .collect();
        assert_eq!(owners.len(), 1, "{k} owned by {owners:?}");
    }
}

#[tokio::test]
async fn test_write_visibility_and_failure_survival() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60, 120, 180, 240]).await;

    nodes[0].swarm.put("hello", json!("world")).await.unwrap();
    for node in nodes.iter() {
        assert_eq!(node.swarm.get("hello").await.unwrap(), Some(json!("world")));
    }
    assert_eq!(nodes[3].swarm.get("nothing").await.unwrap(), None);

    println!("replicate to the successors, then stop the responsible node");
    stabilize_all(&nodes, 3).await;
    let key = nodes[0].swarm.node().space().hash("hello").unwrap();
    let owner = nodes[0].swarm.find_successor(&key).await.unwrap();
    let pos = nodes.iter().position(|n| n.did() == &owner).unwrap();
    let stopped = nodes.remove(pos);
    stopped.swarm.stop().await;
    assert!(!stopped.swarm.is_started());
    assert!(stopped.swarm.hub().is_empty());

    stabilize_all(&nodes, 3).await;
    for node in nodes.iter() {
        let mut value = None;
        for _ in 0..3 {
            match node.swarm.get("hello").await {
                Ok(v) => {
                    value = v;
                    break;
                }
                Err(e) => {
                    println!("{} get failed: {}", node.did(), e);
                    stabilize_all(&nodes, 1).await;
                }
            }
        }
        assert_eq!(value, Some(json!("world")));
    }
    let owners = nodes
        .iter()
        .filter(|n| n.swarm.node().is_responsible_for(&key).unwrap())
        .count();
    assert_eq!(owners, 1);
}

/// First of `ids` at or clockwise after `start`.
fn successor_of(ids: &[u32], start: &Did) -> Did {
    let mut ids: Vec<Did> = ids.iter().map(|n| did(*n)).collect();
    ids.sort();
    ids.iter()
        .find(|id| *id >= start)
        .unwrap_or(&ids[0])
        .clone()
}

#[tokio::test]
async fn test_rejoin_after_leave() {
    let ids = [10, 60, 120, 180, 240];
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &ids).await;
    let space = *nodes[0].swarm.node().space();

    let keys: Vec<String> = (0..100)
        .map(|i| format!("key-{i}"))
        .filter(|k| {
            let h = space.hash(k.as_str()).unwrap();
            in_range(&did(60), &h, &did(120)) || h == did(120)
        })
        .take(3)
        .collect();
    assert_eq!(keys.len(), 3);
    for (i, key) in keys.iter().enumerate() {
        nodes[0].swarm.put(key, json!(i)).await.unwrap();
    }
    stabilize_all(&nodes, 3).await;

    println!("120 leaves");
    let left = nodes.remove(2);
    left.swarm.stop().await;
    drop(left);
    stabilize_all(&nodes, 3).await;
    assert_eq!(nodes[0].swarm.find_successor(&did(100)).await.unwrap(), did(180));

    println!("120 comes back with a fresh swarm");
    let swarm = prepare_swarm(120, &network);
    swarm
        .start(Some(Bootstrap::Local(nodes[0].swarm.clone())))
        .await
        .unwrap();
    nodes.insert(2, Node::new(swarm));
    stabilize_all(&nodes, 5).await;

    let node = nodes[2].swarm.node();
    let successors = node.successor_list().unwrap();
    println!("successors of 120: {:?}", successors);
    assert_eq!(successors[0], did(180));
    assert!(!successors.contains(&did(120)));
    for (i, id) in successors.iter().enumerate() {
        assert!(!successors[i + 1..].contains(id), "{id} listed twice");
    }
    assert_eq!(node.predecessor().unwrap(), did(60));

    let fingers = node.fingers().unwrap();
    for (i, finger) in fingers.iter().enumerate() {
        let start = node.space().finger_start(&did(120), i);
        assert_eq!(finger, &successor_of(&ids, &start), "finger {i}");
    }

    for n in nodes.iter() {
        assert_eq!(n.swarm.find_successor(&did(100)).await.unwrap(), did(120));
        assert_eq!(n.swarm.find_predecessor(&did(100)).await.unwrap(), did(60));
        for (i, key) in keys.iter().enumerate() {
            let mut value = None;
            for _ in 0..3 {
                match n.swarm.get(key).await {
                    Ok(v) => {
                        value = v;
                        break;
                    }
                    Err(e) => {
                        println!("{} get failed: {}", n.did(), e);
                        stabilize_all(&nodes, 1).await;
                    }
                }
            }
            assert_eq!(value, Some(json!(i)), "{key} from {}", n.did());
        }
    }
    let owned = node.local_keys().await.unwrap();
    for key in keys.iter() {
        assert!(owned.contains(&space.hash(key.as_str()).unwrap()));
    }
}
