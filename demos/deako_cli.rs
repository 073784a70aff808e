//! CLI application for controlling devices behind a Deako hub.
//!
//! Run with: cargo run --example deako_cli -- --hub 192.168.1.50 --help

use clap::{Parser, Subcommand};
use std::time::Duration;
use deako_rs::{Client, ClientConfig, ForwardingListener};
use futures::StreamExt;

#[derive(Parser)]
#[command(name = "deako-cli")]
#[command(about = "Control Deako smart lighting from the command line", long_about = None)]
struct Cli {
    /// Address of the hub (port 23 is used if none is given)
    #[arg(long, global = true)]
    hub: String,

    /// Name this client reports to the hub
    #[arg(long, global = true, default_value = "deako-cli")]
    name: String,

    /// Discovery timeout in seconds
    #[arg(short, long, global = true, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover every device behind the hub
    Discover,

    /// Show the name and state of every device
    List,

    /// Turn a device on, keeping its last dim level
    On { uuid: String },

    /// Turn a device off
    Off { uuid: String },

    /// Turn a device on at the given dim level (0-100)
    Dim {
        uuid: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },

    /// Print state changes as the hub reports them
    Watch,

    /// Print session diagnostics after discovery
    Diagnostics,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.hub, &cli.name)
        .with_discovery_timeout(Duration::from_secs(cli.timeout));
    let client = Client::with_config(config);

    println!("Connecting to hub at {}...", client.address());
    client.connect().await?;
    client.set_disconnect_callback(|reason| eprintln!("Hub connection lost: {}", reason));

    let devices = client.discover_devices().await?;

    match cli.command {
        Commands::Discover => {
            println!("\nFound {} device(s):", devices.len());
            for uuid in &devices {
                println!("  {}", uuid);
            }
        }

        Commands::List => {
            for uuid in &devices {
                let device = client.device(uuid)?;
                let state = device.state();
                let dim = match state.dim() {
                    Some(dim) => format!("{}%", dim.value()),
                    None => "-".to_string(),
                };
                println!(
                    "  {:36}  {:24}  {:3}  {}",
                    device.uuid(),
                    device.name(),
                    if state.power() { "ON" } else { "OFF" },
                    dim
                );
            }
        }

        Commands::On { uuid } => {
            match client.turn_on(&uuid, None).await {
                Ok(_) => println!("Sent ON to {}", uuid),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Off { uuid } => {
            match client.turn_off(&uuid).await {
                Ok(_) => println!("Sent OFF to {}", uuid),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Dim { uuid, level } => {
            match client.send_control(&uuid, true, level).await {
                Ok(_) => println!("Sent dim {}% to {}", level, uuid),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Watch => {
            let (listener, mut changes) = ForwardingListener::channel();
            for uuid in &devices {
                client.set_state_callback(uuid, listener.clone());
            }
            println!("Watching {} device(s)... (Press Ctrl+C to stop)\n", devices.len());

            while let Some(uuid) = changes.next().await {
                let state = client.state_for(&uuid)?;
                println!(
                    "[{}] {} power={} dim={:?}",
                    uuid,
                    client.name_for(&uuid)?,
                    state.power(),
                    state.dim().map(|d| d.value())
                );
            }
        }

        Commands::Diagnostics => {
            let diag = client.diagnostics().await;
            println!("\nDiagnostics:\n{}", serde_json::to_string_pretty(&diag)?);
        }
    }

    // Give the hub a moment to confirm control commands before closing.
    tokio::time::sleep(Duration::from_millis(500)).await;
    client.disconnect().await?;
    Ok(())
}
