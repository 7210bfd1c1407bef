use std::sync::Arc;
use std::time::Duration;

use muxnode_core::config::EngineConfig;
use muxnode_core::types::EndpointId;
use muxnode_devices::sim::SimulatedNode;
use muxnode_devices::store::MemoryStore;
use muxnode_engine::node::MuxNodeBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    muxnode_core::logging::init_with_filter("info")?;

    // Simulate a multi-channel node: two dimmers, one switch, one
    // endpoint the engine cannot classify.
    let node = Arc::new(SimulatedNode::new());
    node.add_dimmer(EndpointId::new(1), 40).await;
    node.add_dimmer(EndpointId::new(2), 0).await;
    node.add_switch(EndpointId::new(3), false).await;
    node.add_unsupported(EndpointId::new(4)).await;

    let store = Arc::new(MemoryStore::new());
    store.set_label(EndpointId::new(1), "Kitchen spots").await;

    // A short quiet window so the demo does not wait ten seconds.
    let config = EngineConfig {
        quiet_window_ms: 500,
        ..EngineConfig::default()
    };

    println!("Initializing the engine...");
    let mux = MuxNodeBuilder::new(node.clone())
        .with_store(store)
        .with_config(config)
        .init()
        .await?;

    println!("Classified endpoints:");
    for summary in mux.endpoints(false).await {
        println!("  {} -> {}", summary.id, summary.label);
    }

    // Watch transition events in the background.
    let mut events = mux.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  event: {:?}", event);
        }
    });

    // Queued commands are serialized with spacing between sends.
    println!("Turning on the switch and dimming endpoint 2 to 75%...");
    let a = mux.turn_on(EndpointId::new(3));
    let b = mux.set_dim(EndpointId::new(2), 0.75);
    a.await?;
    b.await?;

    println!(
        "Endpoint 3 is on: {}",
        mux.is_on(EndpointId::new(3)).await?
    );

    // A wall switch press reaches the host as an endpoint-less root report;
    // the engine waits for a quiet window, then polls the dimmers.
    println!("Simulating a local action on endpoint 1...");
    node.local_action(EndpointId::new(1), 99).await;
    tokio::time::sleep(Duration::from_millis(800)).await;

    println!(
        "Endpoint 1 is on: {}",
        mux.is_on(EndpointId::new(1)).await?
    );

    mux.shutdown();
    watcher.abort();
    println!("Done.");
    Ok(())
}
