use crate::error::Error;
use crate::swarm::Bootstrap;
use crate::swarm::SwarmEvent;
use crate::tests::did;
use crate::tests::manually_establish_connection;
use crate::tests::prepare_ring;
use crate::tests::prepare_swarm;
use crate::tests::Node;
use chordmesh_transport::connections::MemoryNetwork;

#[tokio::test]
async fn test_connect_through_introducer() {
    let network = MemoryNetwork::new();
    let mut a = Node::new(prepare_swarm(10, &network));
    let b = Node::new(prepare_swarm(60, &network));
    let mut c = Node::new(prepare_swarm(120, &network));

    a.swarm.connect_local(&b.swarm).await.unwrap();
    manually_establish_connection(b.swarm.hub(), c.swarm.hub()).await;
    assert!(!a.swarm.hub().has(&did(120)));

    a.swarm.connect(&did(120)).await.unwrap();
    assert!(a.swarm.hub().has(&did(120)));
    a.wait_event(|ev| matches!(ev, SwarmEvent::PeerConnected { peer } if peer == &did(120)))
        .await;
    c.wait_event(|ev| matches!(ev, SwarmEvent::PeerConnected { peer } if peer == &did(10)))
        .await;
    assert!(c.swarm.hub().has(&did(10)));

    println!("connecting again is a no-op");
    a.swarm.connect(&did(120)).await.unwrap();
    assert_eq!(a.swarm.hub().len(), 2);
}

#[tokio::test]
async fn test_connect_without_introducer() {
    let network = MemoryNetwork::new();
    let swarm = prepare_swarm(10, &network);

    let err = swarm.connect(&did(99)).await.unwrap_err();
    assert!(matches!(err, Error::NoIntroducer(_)));
    let err = swarm.connect(&did(10)).await.unwrap_err();
    assert!(matches!(err, Error::ShouldNotConnectSelf));
}

#[tokio::test]
async fn test_start_twice_and_failed_join() {
    let network = MemoryNetwork::new();
    let swarm = prepare_swarm(10, &network);
    swarm.start(None).await.unwrap();
    assert!(swarm.is_started());
    let err = swarm.start(None).await.unwrap_err();
    assert!(matches!(err, Error::SwarmAlreadyStarted));
    swarm.stop().await;
    assert!(!swarm.is_started());

    let lonely = prepare_swarm(20, &network);
    let err = lonely
        .start(Some(Bootstrap::Peer(did(99))))
        .await
        .unwrap_err();
    println!("join failed: {}", err);
    assert!(matches!(err, Error::JoinFailure(d, 2) if d == did(99)));
    assert!(!lonely.is_started());
    assert_eq!(lonely.node().successor().unwrap(), did(20));
}

#[tokio::test]
async fn test_ping() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60]).await;

    nodes[0].swarm.ping(&did(60)).await.unwrap();
    nodes[0]
        .wait_event(|ev| matches!(ev, SwarmEvent::Ping))
        .await;
}

#[tokio::test]
async fn test_inspect() {
    let network = MemoryNetwork::new();
    let nodes = prepare_ring(&network, &[10, 60]).await;
    nodes[0].swarm.put("k", serde_json::json!("v")).await.unwrap();

    let info = nodes[0].swarm.inspect().await;
    println!("{}", serde_json::to_string_pretty(&info).unwrap());
    assert!(info.started);
    assert_eq!(info.ring.did, did(10).to_string());
    assert_eq!(info.ring.successors[0], did(60).to_string());
    assert_eq!(info.ring.predecessors[0], did(60).to_string());
    let link = info
        .connections
        .iter()
        .find(|c| c.did == did(60).to_string())
        .unwrap();
    assert!(link.created > 0);
    assert!(link.last_active >= link.created);

    let mut items = 0;
    for node in nodes.iter() {
        items += node.swarm.inspect().await.storage.items.len();
    }
    assert!(items >= 1);
}

#[tokio::test]
async fn test_stop_reports_loss() {
    let network = MemoryNetwork::new();
    let mut nodes = prepare_ring(&network, &[10, 60]).await;
    assert_eq!(nodes[0].swarm.node().successor().unwrap(), did(60));

    nodes[1].swarm.stop().await;
    nodes[0]
        .wait_event(|ev| matches!(ev, SwarmEvent::PeerLost { peer } if peer == &did(60)))
        .await;
    assert!(!nodes[0].swarm.hub().has(&did(60)));
    assert_eq!(nodes[0].swarm.node().successor().unwrap(), did(10));
    assert_eq!(nodes[0].swarm.node().predecessor().unwrap(), did(10));
}
