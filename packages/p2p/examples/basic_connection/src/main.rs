#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::too_many_lines)]

//! Basic P2P Connection Example
//!
//! This example demonstrates the fundamental operations of the `switchy_p2p` library:
//! - Creating P2P nodes with deterministic IDs on a shared simulated network
//! - Linking nodes with latency and routing through an intermediate node
//! - Peer discovery with name registration
//! - Sending and receiving messages, partitions and healing

use std::time::Duration;

use switchy_p2p::{
    P2PConnection, P2PListener, P2PSystem, SimulatorConfig,
    simulator::{LinkInfo, SimulatorNetwork, SimulatorNodeId},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    println!("=== Switchy P2P Basic Connection Example ===\n");

    // Step 1: Build one simulated network shared by every node
    println!("Step 1: Creating a simulated network...");
    let config = SimulatorConfig::from_env()?
        .with_default_latency(Duration::from_millis(20))
        .with_default_packet_loss(0.0)
        .with_discovery_delay(Duration::from_millis(10));
    let network = SimulatorNetwork::new(config)?;
    println!("  Config: {:?}", network.config());
    println!();

    // Step 2: Create P2P nodes with deterministic seed values
    println!("Step 2: Creating P2P nodes with deterministic IDs...");
    let alice = network.node("alice")?;
    let bob = network.node("bob")?;
    let carol = network.node("carol")?;

    let alice_id = alice.local_node_id().clone();
    let bob_id = bob.local_node_id().clone();
    let carol_id = carol.local_node_id().clone();

    println!("  Alice's Node ID: {}", alice_id.fmt_short());
    println!("  Bob's Node ID:   {}", bob_id.fmt_short());
    println!("  Carol's Node ID: {}", carol_id.fmt_short());
    println!("  Full Alice ID:   {alice_id}");
    println!();

    // Step 3: Link alice <-> bob <-> carol; alice and carol share no link
    println!("Step 3: Building the topology...");
    let hop = LinkInfo::lossless(Duration::from_millis(10));
    network.connect_nodes_with(&alice_id, &bob_id, hop.clone())?;
    network.connect_nodes_with(&bob_id, &carol_id, hop)?;
    let path = network
        .find_path(&alice_id, &carol_id)?
        .ok_or("no path from alice to carol")?;
    println!(
        "  Path alice -> carol: {}",
        path.iter()
            .map(SimulatorNodeId::fmt_short)
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!();

    // Step 4: Register peers in the discovery system
    println!("Step 4: Registering peers for discovery...");
    carol.register_peer("carol-service", &carol_id)?;
    bob.register_peer("bob-service", &bob_id)?;
    println!("  Registered bob-service and carol-service");
    println!();

    // Step 5: Carol listens, alice discovers and connects by name
    println!("Step 5: Discovering carol and connecting...");
    let mut listener = carol.listen("p2p://carol").await?;
    let mut to_carol = alice.connect_by_name("carol-service").await?;
    let mut from_alice = listener.accept().await?;
    println!(
        "  {} accepted a connection from {}",
        listener.local_addr(),
        from_alice.remote_node_id().fmt_short()
    );

    match alice.discover("non-existent-service").await {
        Ok(id) => println!("  Unexpectedly found: {}", id.fmt_short()),
        Err(e) => println!("  Expected error: {e}"),
    }
    println!();

    // Step 6: Exchange messages across two hops
    println!("Step 6: Exchanging messages...");
    let start = tokio::time::Instant::now();
    to_carol.send(b"hello carol").await?;
    println!("  send took {:?} (two 10ms hops)", start.elapsed());
    let message = from_alice.recv().await?;
    println!("  Carol received: {}", String::from_utf8_lossy(&message));

    from_alice.send(b"hello alice").await?;
    let reply = to_carol.recv().await?;
    println!("  Alice received: {}", String::from_utf8_lossy(&reply));
    println!();

    // Step 7: Partition bob away, then heal
    println!("Step 7: Partitioning and healing...");
    network.add_partition(
        std::slice::from_ref(&bob_id),
        &[alice_id.clone(), carol_id.clone()],
    )?;
    match to_carol.send(b"are you there?").await {
        Ok(()) => println!("  Unexpectedly delivered"),
        Err(e) => println!("  Expected error: {e}"),
    }
    network.heal_partition(std::slice::from_ref(&bob_id), &[alice_id, carol_id])?;
    to_carol.send(b"back again").await?;
    println!(
        "  After heal carol received: {}",
        String::from_utf8_lossy(&from_alice.recv().await?)
    );
    println!();

    // Step 8: Closing
    println!("Step 8: Closing the connection...");
    to_carol.close()?;
    println!("  Connected: {}", to_carol.is_connected());
    match to_carol.send(b"too late").await {
        Ok(()) => println!("  Unexpectedly sent"),
        Err(e) => println!("  Expected error: {e}"),
    }
    println!();

    println!("=== Example completed successfully! ===");
    Ok(())
}
