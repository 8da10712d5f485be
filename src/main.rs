//! Mocaplink - serial telemetry bridge CLI
//!
//! Headless front end for the bridge: enumerate ports, stream decoded
//! records to stdout as JSON lines, or fire a single device command.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mocaplink_core::core::command::DeviceCommand;
use mocaplink_core::core::connection::{ConnectionEvent, ConnectionManager};
use mocaplink_core::core::hub::{Hub, SinkError, SubscriberSink};
use mocaplink_core::core::protocol::Payload;
use mocaplink_core::core::transport::available_ports;
use mocaplink_core::AppConfig;
use std::io::Write;
use std::sync::Arc;

/// Mocaplink CLI
#[derive(Parser, Debug)]
#[command(
    name = "mocaplink",
    version,
    about = "Serial telemetry bridge for motion-capture sensor nodes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts {
        /// Show USB descriptor details
        #[arg(short, long)]
        detailed: bool,
    },

    /// Connect and stream decoded records to stdout as JSON lines
    Monitor {
        /// Serial port path (e.g. /dev/ttyUSB0, COM3)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Send the start-streaming command after connecting
        #[arg(short, long)]
        start: bool,
    },

    /// Send a single command to the device
    Send {
        /// Serial port path
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Command code (S, X, C, I, P, N, R, Q, D:<0-3>)
        code: String,
    },
}

/// Serializes every record as one JSON line on stdout.
struct StdoutSink;

impl SubscriberSink for StdoutSink {
    fn deliver(&self, payload: &Payload) -> Result<(), SinkError> {
        let line = serde_json::to_string(payload)
            .map_err(|e| SinkError::Delivery(e.to_string()))?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}").map_err(|_| SinkError::Closed)
    }
}

fn list_ports(detailed: bool) {
    let ports = available_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        if detailed {
            println!(
                "{}\tvid={}\tpid={}\tserial={}\tmanufacturer={}",
                port.path,
                port.vendor_id
                    .map_or_else(|| "-".to_string(), |v| format!("{v:04x}")),
                port.product_id
                    .map_or_else(|| "-".to_string(), |p| format!("{p:04x}")),
                port.serial_number.as_deref().unwrap_or("-"),
                port.manufacturer.as_deref().unwrap_or("-"),
            );
        } else {
            println!("{}", port.path);
        }
    }
}

async fn monitor(config: &AppConfig, port: &str, baud: u32, start: bool) -> Result<()> {
    let hub = Arc::new(Hub::new(config.hub_config()));
    hub.subscribe(Box::new(StdoutSink));
    let _hub_tasks = hub.start();

    let manager = ConnectionManager::new(hub, config.connection_config());
    let mut events = manager.subscribe_events();

    manager
        .connect(port, baud)
        .await
        .with_context(|| format!("failed to connect to {port}"))?;
    if start {
        manager.send_command(DeviceCommand::StartStreaming).await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(ConnectionEvent::Disconnected { reason }) => {
                        tracing::warn!("disconnected: {reason}");
                    }
                    Ok(ConnectionEvent::Rediscovered { previous_port, new_port }) => {
                        tracing::info!("device moved from {previous_port} to {new_port}");
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    let stats = manager.stats();
    tracing::info!(
        "session totals: {} frames, {} log lines, {} missed, {} out-of-order",
        stats.frames,
        stats.log_lines,
        stats.continuity.missed,
        stats.continuity.out_of_order
    );
    manager.disconnect().await;
    Ok(())
}

async fn send(config: &AppConfig, port: &str, baud: u32, code: &str) -> Result<()> {
    let command =
        DeviceCommand::parse(code).ok_or_else(|| anyhow!("unknown command code: {code}"))?;

    let hub = Arc::new(Hub::default());
    let manager = ConnectionManager::new(hub, config.connection_config());
    manager
        .connect(port, baud)
        .await
        .with_context(|| format!("failed to connect to {port}"))?;
    manager.send_command(command).await?;
    manager.disconnect().await;
    println!("sent {command}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("could not load config, using defaults: {e}");
        AppConfig::default()
    });

    match cli.command {
        Commands::ListPorts { detailed } => {
            list_ports(detailed);
            Ok(())
        }
        Commands::Monitor { port, baud, start } => {
            let port = port.unwrap_or_else(|| config.link.port.clone());
            let baud = baud.unwrap_or(config.link.baud_rate);
            monitor(&config, &port, baud, start).await
        }
        Commands::Send { port, baud, code } => {
            let port = port.unwrap_or_else(|| config.link.port.clone());
            let baud = baud.unwrap_or(config.link.baud_rate);
            send(&config, &port, baud, &code).await
        }
    }
}
