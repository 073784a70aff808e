//! Connect to a hub, list its devices and print every state change.
//!
//! Run with: cargo run --example watch_devices -- 192.168.1.50

use std::time::Duration;
use deako_rs::{Client, runtime};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::args()
        .nth(1)
        .ok_or("usage: watch_devices <hub address>")?;

    let client = Client::new(&address, "watch_devices");
    client.connect().await?;
    client.set_disconnect_callback(|reason| eprintln!("Disconnected: {}", reason));

    let devices = client.discover_devices().await?;
    println!("Found {} device(s):", devices.len());
    for uuid in &devices {
        let state = client.state_for(uuid)?;
        println!(
            "  - {} ({}): {}",
            client.name_for(uuid)?,
            uuid,
            if state.power() { "on" } else { "off" }
        );

        client.set_state_callback(uuid, |uuid: &str| println!("  * {} changed", uuid));
    }

    println!("\nListening for changes... (Press Ctrl+C to stop)\n");
    while client.is_connected() {
        runtime::sleep(Duration::from_secs(1)).await;
    }
    Ok(())
}
