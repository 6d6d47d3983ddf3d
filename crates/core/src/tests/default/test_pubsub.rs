use serde_json::json;

use crate::swarm::SwarmEvent;
use crate::tests::did;
use crate::tests::prepare_ring;
use crate::tests::Node;
use chordmesh_transport::connections::MemoryNetwork;

async fn wait_subscribers(node: &mut Node, count: usize) {
    node.wait_event(|ev| {
        matches!(ev, SwarmEvent::SubscriptionUpdate { subscribers, .. } if subscribers.len() == count)
    })
    .await;
}

#[tokio::test]
async fn test_publish_subscribe() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60, 120, 180]).await;

    nodes[1].swarm.subscribe("news").await.unwrap();
    nodes[2].swarm.subscribe("news").await.unwrap();
    wait_subscribers(&mut nodes[1], 2).await;
    nodes[3].swarm.subscribe("news").await.unwrap();
    wait_subscribers(&mut nodes[1], 3).await;
    wait_subscribers(&mut nodes[2], 3).await;

    let subscribers = nodes[2].swarm.subscribers("news").unwrap().unwrap();
    assert_eq!(
        subscribers.keys().cloned().collect::<Vec<_>>(),
        vec![did(60), did(120), did(180)]
    );
    assert!(nodes[0].swarm.subscribers("news").unwrap().is_none());

    println!("a node outside the channel publishes");
    nodes[0]
        .swarm
        .publish("news", "headline", json!("first"))
        .await
        .unwrap();
    for node in nodes.iter_mut().skip(1) {
        let msg = node.listen_once().await;
        assert_eq!(msg.from, did(10));
        assert_eq!(msg.name, "headline");
        assert_eq!(msg.data, json!("first"));
    }
    nodes[0].assert_no_message().await;

    println!("a subscriber publishes, it does not hear itself");
    nodes[2]
        .swarm
        .publish("news", "headline", json!("second"))
        .await
        .unwrap();
    assert_eq!(nodes[1].listen_once().await.data, json!("second"));
    assert_eq!(nodes[3].listen_once().await.data, json!("second"));
    nodes[2].assert_no_message().await;
}

#[tokio::test]
async fn test_unsubscribe() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60, 120, 180]).await;

    for node in nodes.iter().skip(1) {
        node.swarm.subscribe("news").await.unwrap();
    }
    wait_subscribers(&mut nodes[1], 3).await;
    wait_subscribers(&mut nodes[2], 3).await;

    nodes[1].swarm.unsubscribe("news").await.unwrap();
    assert!(nodes[1].swarm.subscribers("news").unwrap().is_none());
    wait_subscribers(&mut nodes[2], 2).await;
    wait_subscribers(&mut nodes[3], 2).await;

    nodes[0]
        .swarm
        .publish("news", "headline", json!("late"))
        .await
        .unwrap();
    assert_eq!(nodes[2].listen_once().await.data, json!("late"));
    assert_eq!(nodes[3].listen_once().await.data, json!("late"));
    nodes[1].assert_no_message().await;

    println!("publishing to an empty channel is fine");
    nodes[0]
        .swarm
        .publish("nobody", "headline", json!(null))
        .await
        .unwrap();
}
