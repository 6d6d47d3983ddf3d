use serde_json::json;

use crate::error::Error;
use crate::tests::did;
use crate::tests::prepare_ring;
use crate::tests::prepare_swarm;
use crate::tests::Node;
use chordmesh_transport::connections::MemoryNetwork;

#[tokio::test]
async fn test_ttl_boundary() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60, 120, 180, 240]).await;
    let sender = nodes[0].swarm.clone();
    assert!(sender.hub().has(&did(60)));
    assert!(sender.hub().has(&did(120)));

    println!("ttl 0 reaches nobody");
    sender.send(vec![did(60)], "t0", json!(0), Some(0)).await.unwrap();
    nodes[1].assert_no_message().await;

    println!("ttl 1 reaches a linked node");
    sender.send(vec![did(60)], "t1", json!(1), Some(1)).await.unwrap();
    let msg = nodes[1].listen_once().await;
    assert_eq!(msg.from, did(10));
    assert_eq!(msg.name, "t1");
    assert_eq!(msg.data, json!(1));

    println!("drop the direct link to 180, it is now two hops away");
    sender.hub().remove(&did(180)).await;
    assert!(!sender.hub().has(&did(180)));
    assert_eq!(sender.node().closest_preceding_finger(&did(180)).unwrap(), did(120));

    sender.send(vec![did(180)], "far", json!(1), Some(1)).await.unwrap();
    nodes[3].assert_no_message().await;

    sender.send(vec![did(180)], "far", json!(2), Some(2)).await.unwrap();
    let msg = nodes[3].listen_once().await;
    assert_eq!(msg.from, did(10));
    assert_eq!(msg.data, json!(2));
    nodes[2].assert_no_message().await;
}

#[tokio::test]
async fn test_forward_to_self_and_many() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60, 120, 180, 240]).await;
    let sender = nodes[0].swarm.clone();

    sender.send(vec![did(10)], "me", json!("hi"), Some(1)).await.unwrap();
    assert_eq!(nodes[0].listen_once().await.name, "me");
    sender.send(vec![did(10)], "me", json!("hi"), Some(0)).await.unwrap();
    nodes[0].assert_no_message().await;

    let targets = vec![did(60), did(120), did(180), did(240), did(60)];
    sender.send(targets, "all", json!("hi"), None).await.unwrap();
    for node in nodes.iter_mut().skip(1) {
        let msg = node.listen_once().await;
        assert_eq!(msg.name, "all");
        assert_eq!(msg.from, did(10));
        node.assert_no_message().await;
    }
    nodes[0].assert_no_message().await;
}

#[tokio::test]
async fn test_no_route() {
    let network = MemoryNetwork::new();
    let mut node = Node::new(prepare_swarm(10, &network));

    let err = node
        .swarm
        .send(vec![did(5), did(10)], "lost", json!(null), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoRoute(d) if d == did(5)));
    println!("self is still served");
    assert_eq!(node.listen_once().await.name, "lost");
}

#[tokio::test]
async fn test_relay_through_shared_hop() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60, 120, 150, 180, 240]).await;
    let sender = nodes[0].swarm.clone();
    sender.hub().remove(&did(180)).await;
    sender.hub().remove(&did(240)).await;

    println!("180 and 240 share the hop 150");
    sender
        .send(vec![did(180), did(240)], "far", json!("hi"), None)
        .await
        .unwrap();
    for node in nodes.iter_mut().skip(4) {
        let msg = node.listen_once().await;
        assert_eq!(msg.name, "far");
        assert_eq!(msg.from, did(10));
        node.assert_no_message().await;
    }
    nodes[3].assert_no_message().await;
    assert!(!sender.hub().has(&did(180)));
}
