#![cfg(feature = "simulator")]

use std::time::Duration;

use pretty_assertions::assert_eq;
use switchy_p2p::{
    P2PConnection, P2PError, P2PListener, P2PNodeId, P2PResult, P2PSystem, SimulatorConfig,
    simulator::{LinkInfo, SimulatorNetwork, SimulatorNodeId},
};

/// Sends `payloads` from `a` to `b` over a fresh connection and returns what
/// `b` received. Written only against the capability traits.
async fn exchange<S: P2PSystem>(a: &S, b: &S, payloads: &[&[u8]]) -> P2PResult<Vec<Vec<u8>>> {
    let mut listener = b.listen("p2p://exchange").await?;
    let mut outbound = a.connect(b.local_node_id().clone()).await?;
    let mut inbound = listener.accept().await?;
    assert_eq!(inbound.remote_node_id(), a.local_node_id());

    for payload in payloads {
        outbound.send(payload).await?;
    }

    let mut received = Vec::with_capacity(payloads.len());
    for _ in payloads {
        received.push(inbound.recv().await?);
    }
    Ok(received)
}

async fn lifecycle<S: P2PSystem>(a: &S, b: &S) -> P2PResult<()> {
    let mut outbound = a.connect(b.local_node_id().clone()).await?;
    let mut inbound = b.connect(a.local_node_id().clone()).await?;
    assert!(inbound.is_connected());

    outbound.send(b"before close").await?;
    inbound.close()?;

    assert!(!inbound.is_connected());
    assert_eq!(inbound.send(b"after").await, Err(P2PError::ConnectionClosed));
    assert_eq!(inbound.recv().await?, b"before close".to_vec());
    Ok(())
}

fn identity_contract<I: P2PNodeId>() {
    let bytes = [0xa5; 32];
    let id = I::from_bytes(&bytes).unwrap();
    assert_eq!(id.as_bytes(), &bytes);
    assert_eq!(id.fmt_short().len(), 10);
    assert_eq!(I::from_seed("alice"), I::from_seed("alice"));
    assert_ne!(I::from_seed("alice"), I::from_seed("bob"));
}

fn lossless_network() -> SimulatorNetwork {
    SimulatorNetwork::new(
        SimulatorConfig::default()
            .with_default_latency(Duration::from_millis(10))
            .with_default_packet_loss(0.0)
            .with_discovery_delay(Duration::from_millis(5))
            .with_seed(2024),
    )
    .unwrap()
}

#[test_log::test]
fn simulator_node_id_satisfies_identity_contract() {
    identity_contract::<SimulatorNodeId>();
}

#[test_log::test(tokio::test(start_paused = true))]
async fn exchange_is_byte_identical_and_ordered() {
    let network = lossless_network();
    let alice = network.node("alice").unwrap();
    let bob = network.node("bob").unwrap();
    network
        .connect_nodes(alice.local_node_id(), bob.local_node_id())
        .unwrap();

    let payloads: [&[u8]; 4] = [b"one", b"", &[0, 1, 2, 255], b"four"];
    let received = exchange(&alice, &bob, &payloads).await.unwrap();
    assert_eq!(
        received,
        payloads.iter().map(|p| p.to_vec()).collect::<Vec<_>>()
    );
}

#[test_log::test(tokio::test(start_paused = true))]
async fn connection_lifecycle() {
    let network = lossless_network();
    let alice = network.node("alice").unwrap();
    let bob = network.node("bob").unwrap();
    network
        .connect_nodes(alice.local_node_id(), bob.local_node_id())
        .unwrap();

    lifecycle(&alice, &bob).await.unwrap();
}

#[test_log::test(tokio::test(start_paused = true))]
async fn three_node_relay_scenario() {
    let network = lossless_network();
    let a = network.node("a").unwrap();
    let b = network.node("b").unwrap();
    let c = network.node("c").unwrap();
    let hop = LinkInfo::lossless(Duration::from_millis(10));
    network
        .connect_nodes_with(a.local_node_id(), b.local_node_id(), hop.clone())
        .unwrap();
    network
        .connect_nodes_with(b.local_node_id(), c.local_node_id(), hop)
        .unwrap();

    assert_eq!(
        network
            .find_path(a.local_node_id(), c.local_node_id())
            .unwrap(),
        Some(vec![
            a.local_node_id().clone(),
            b.local_node_id().clone(),
            c.local_node_id().clone(),
        ])
    );

    let mut to_c = a.connect(c.local_node_id().clone()).await.unwrap();
    let mut from_a = c.connect(a.local_node_id().clone()).await.unwrap();

    let start = tokio::time::Instant::now();
    to_c.send(b"relayed").await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(20), "elapsed={elapsed:?}");
    assert!(elapsed < Duration::from_millis(22), "elapsed={elapsed:?}");

    assert_eq!(from_a.recv().await.unwrap(), b"relayed".to_vec());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn partition_then_heal() {
    let network = lossless_network();
    let alice = network.node("alice").unwrap();
    let bob = network.node("bob").unwrap();
    let group_a = [alice.local_node_id().clone()];
    let group_b = [bob.local_node_id().clone()];
    network
        .connect_nodes_with(
            alice.local_node_id(),
            bob.local_node_id(),
            LinkInfo::lossless(Duration::from_millis(3)),
        )
        .unwrap();

    let mut before = alice.connect(bob.local_node_id().clone()).await.unwrap();

    network.add_partition(&group_a, &group_b).unwrap();
    assert_eq!(
        network
            .find_path(alice.local_node_id(), bob.local_node_id())
            .unwrap(),
        None
    );
    assert!(matches!(
        before.send(b"split").await,
        Err(P2PError::NoRoute { .. })
    ));
    assert!(matches!(
        alice.connect(bob.local_node_id().clone()).await,
        Err(P2PError::NoRoute { .. })
    ));

    network.heal_partition(&group_a, &group_b).unwrap();
    let mut after = alice.connect(bob.local_node_id().clone()).await.unwrap();
    let mut inbound = bob.connect(alice.local_node_id().clone()).await.unwrap();

    // Healed links carry the default 10ms, not the original 3ms
    let start = tokio::time::Instant::now();
    after.send(b"healed").await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(10));
    assert_eq!(inbound.recv().await.unwrap(), b"healed".to_vec());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn discovery_round_trip_then_connect() {
    let network = lossless_network();
    let alice = network.node("alice").unwrap();
    let bob = network.node("bob").unwrap();
    network
        .connect_nodes(alice.local_node_id(), bob.local_node_id())
        .unwrap();

    alice
        .register_peer("alice", alice.local_node_id())
        .unwrap();

    assert_eq!(&bob.discover("alice").await.unwrap(), alice.local_node_id());
    assert!(matches!(
        bob.discover("bob").await,
        Err(P2PError::DiscoveryFailed(_))
    ));

    let conn = bob.connect_by_name("alice").await.unwrap();
    assert_eq!(conn.remote_node_id(), alice.local_node_id());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn loss_is_silent_and_total() {
    let network = lossless_network();
    let alice = network.node("alice").unwrap();
    let bob = network.node("bob").unwrap();
    network
        .connect_nodes_with(
            alice.local_node_id(),
            bob.local_node_id(),
            LinkInfo::new(Duration::from_millis(1), 1.0),
        )
        .unwrap();

    let mut outbound = alice.connect(bob.local_node_id().clone()).await.unwrap();
    let inbound = bob.connect(alice.local_node_id().clone()).await.unwrap();

    for _ in 0..500 {
        outbound.send(b"into the void").await.unwrap();
    }
    assert_eq!(inbound.try_recv(), Ok(None));
}

#[test_log::test(tokio::test(start_paused = true))]
async fn systems_on_separate_networks_are_isolated() {
    let left = lossless_network();
    let right = lossless_network();
    let alice = left.node("alice").unwrap();
    let bob = right.node("bob").unwrap();

    assert!(matches!(
        alice.connect(bob.local_node_id().clone()).await,
        Err(P2PError::NodeNotFound(_))
    ));
}
