// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Strandroute fabric node CLI.
//!
//! # Usage
//!
//! ```bash
//! # Run a node from a config file
//! strandrouted --config fabric.toml
//!
//! # Generate a starter config file
//! strandrouted gen-config --output fabric.toml --self-node-id 0102...0f10
//!
//! # Validate a config file without running
//! strandrouted validate --config fabric.toml
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use strandroute::{
    FabricConfig, Frame, ForwardingEngine, GossipState, GossipTransport, NodeId, NullOffload,
    OffloadClient, RoutingTable, Sad, SendFailure, SendSink,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "strandrouted")]
#[command(about = "Strandroute semantic routing fabric node")]
#[command(version)]
struct Args {
    /// Configuration file path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Statistics reporting interval (seconds, 0 to disable).
    #[arg(long, default_value = "10")]
    stats_interval: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an example configuration file.
    GenConfig {
        /// Output file path.
        #[arg(short, long, default_value = "fabric.toml")]
        output: PathBuf,

        /// Node identity to embed (32 hex chars). Random if omitted.
        #[arg(long)]
        self_node_id: Option<String>,
    },

    /// Validate a configuration file.
    Validate {
        /// Configuration file path.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show fabric status (requires a running node's admin interface).
    Status,
}

/// A `SendSink`/`GossipTransport` that merely logs; there is no live
/// network transport in this core, matching the reference's
/// callback-polymorphism design (a real deployment wires a UDP/QUIC
/// transport in behind the same traits).
struct LoggingTransport;

impl SendSink for LoggingTransport {
    fn send(&self, port: u16, frame: &Frame) -> Result<(), SendFailure> {
        tracing::debug!(port, dst = %frame.header.dst_node_id, "would send frame");
        Ok(())
    }
}

impl GossipTransport for LoggingTransport {
    fn send(&self, dst: NodeId, msg: &[u8]) {
        tracing::debug!(%dst, len = msg.len(), "would send gossip message");
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig {
                output,
                self_node_id,
            } => cmd_gen_config(output, self_node_id),
            Commands::Validate { config } => cmd_validate(config),
            Commands::Status => cmd_status().await,
        };
    }

    let config = match &args.config {
        Some(path) => FabricConfig::from_file(path)?,
        None => {
            eprintln!("error: --config is required to run a node (or use a subcommand)");
            std::process::exit(2);
        }
    };
    config.validate()?;

    println!("Strandroute fabric node v{}", env!("CARGO_PKG_VERSION"));
    println!("============================");
    println!("node:      {}", config.self_node_id);
    println!("name:      {}", config.name);
    println!("port:      {}", config.listen_port);
    println!();

    let offload: Arc<dyn OffloadClient> = Arc::new(NullOffload);
    let table = Arc::new(
        RoutingTable::with_weights(config.weights).with_offload(offload),
    );
    let forwarding = Arc::new(ForwardingEngine::with_max_multipath(
        config.self_node_id,
        table.clone(),
        LoggingTransport,
        config.max_multipath,
    ));
    let gossip = Arc::new(GossipState::new(
        config.self_node_id,
        table.clone(),
        LoggingTransport,
    ));
    gossip.set_local_capabilities(Sad::new(), Default::default(), 0);

    for peer in &config.bootstrap_peers {
        gossip.join(*peer, config.listen_port);
    }

    println!("Press Ctrl+C to stop...");
    println!();

    let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let tick_interval_ms = config.tick_interval_ms;
    let gc_interval_ns = config.gc_interval_secs.saturating_mul(1_000_000_000);
    let last_gc = Arc::new(AtomicU64::new(0));

    let driver_handle = {
        let table = table.clone();
        let gossip = gossip.clone();
        let shutdown = shutdown.clone();
        let last_gc = last_gc.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(tick_interval_ms));
            while !shutdown.load(Ordering::Relaxed) {
                interval.tick().await;
                let now = now_ns();
                gossip.tick(now);

                let prev = last_gc.load(Ordering::Relaxed);
                if now.saturating_sub(prev) >= gc_interval_ns {
                    last_gc.store(now, Ordering::Relaxed);
                    let evicted = table.gc(now);
                    if evicted > 0 {
                        tracing::debug!(evicted, "routing table gc swept expired entries");
                    }
                }
            }
        })
    };

    let stats_handle = {
        let table = table.clone();
        let forwarding = forwarding.clone();
        let gossip = gossip.clone();
        let shutdown = shutdown.clone();
        let stats_interval = args.stats_interval;
        tokio::spawn(async move {
            if stats_interval == 0 {
                return;
            }
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            while !shutdown.load(Ordering::Relaxed) {
                interval.tick().await;
                print_stats(&table, &forwarding, &gossip);
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    shutdown.store(true, Ordering::Relaxed);
    driver_handle.abort();
    stats_handle.abort();

    println!("\nFinal statistics:");
    print_stats(&table, &forwarding, &gossip);

    Ok(())
}

fn print_stats<S: SendSink, T: GossipTransport>(
    table: &RoutingTable,
    forwarding: &ForwardingEngine<S>,
    gossip: &GossipState<T>,
) {
    let fwd = forwarding.stats();
    println!(
        "  routing table: {} entries | forwarded {} | dropped {} | resolved {} | resolve failures {}",
        table.size(),
        fwd.frames_forwarded,
        fwd.frames_dropped,
        fwd.frames_resolved,
        fwd.resolve_failures,
    );
    println!(
        "  gossip: active view {} | passive view {}",
        gossip.active_view().len(),
        gossip.passive_view().len(),
    );
}

fn cmd_gen_config(
    output: PathBuf,
    self_node_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let node_id = match self_node_id {
        Some(s) => s.parse::<NodeId>().map_err(|e| e.to_string())?,
        None => {
            let mut bytes = [0u8; 16];
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = (i as u8 + 1).wrapping_mul(17);
            }
            NodeId::new(bytes)
        }
    };

    let config = FabricConfig::for_node(node_id);
    let toml_str = toml::to_string_pretty(&config)?;
    let content = format!(
        "# Strandroute fabric node configuration\n# Generated by `strandrouted gen-config`\n\n{}",
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match FabricConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Node: {}", config.name);
            println!("Self node id: {}", config.self_node_id);
            println!("Listen port: {}", config.listen_port);
            println!("Bootstrap peers: {}", config.bootstrap_peers.len());
            println!("Max multipath: {}", config.max_multipath);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

async fn cmd_status() -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("strandrouted status");
    eprintln!("--------------------");
    eprintln!("The `status` command requires a running node with an admin interface.");
    eprintln!();
    eprintln!("This feature is planned for a future release.");
    eprintln!("It will connect to the node's admin socket to report:");
    eprintln!("  - Routing table size and top entries");
    eprintln!("  - Active/passive gossip view membership");
    eprintln!("  - Forwarding counters and drop reasons");
    Ok(())
}
