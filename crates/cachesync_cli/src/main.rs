//! CacheSync CLI
//!
//! # Commands
//!
//! - `serve` - Run a sync server, optionally mutating seeded items on a
//!   timer (handy for demos and manual testing)
//! - `watch` - Run a client mirror against a server and log what changes

use clap::{Parser, Subcommand};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CacheSync command-line tools.
#[derive(Parser)]
#[command(name = "cachesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync server
    Serve {
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1:7450")]
        bind: SocketAddr,

        /// Number of items to seed the store with
        #[arg(short, long, default_value_t = 5)]
        seed: u64,

        /// Update a randomly chosen item every N seconds (0 disables)
        #[arg(long, default_value_t = 0)]
        demo_update: u64,
    },

    /// Mirror a server locally and log applied updates
    Watch {
        /// Server address to connect to
        #[arg(short, long, default_value = "127.0.0.1:7450")]
        server: SocketAddr,

        /// Reconciliation poll interval in seconds
        #[arg(short, long, default_value_t = 30)]
        poll: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            seed,
            demo_update,
        } => serve(bind, seed, demo_update).await,
        Commands::Watch { server, poll } => watch(server, poll).await,
    }
}

async fn serve(
    bind: SocketAddr,
    seed: u64,
    demo_update: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = cachesync_server::SyncServer::new(cachesync_server::ServerConfig::new(bind));
    let store = server.store();

    for id in 0..seed {
        store.update(id, format!("Content {id}"));
    }
    info!(items = seed, "store seeded");

    if demo_update > 0 {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(demo_update));
            ticker.tick().await; // first tick is immediate
            loop {
                ticker.tick().await;
                let id = rand::thread_rng().gen_range(0..seed.max(1));
                let version = store.update(id, format!("Updated content {id}"));
                info!(item = id, version, "demo update");
            }
        });
    }

    let handle = server.bind().await?;
    info!(addr = %handle.local_addr(), "serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    Ok(())
}

async fn watch(server: SocketAddr, poll: u64) -> Result<(), Box<dyn std::error::Error>> {
    let config = cachesync_client::ClientConfig::new(server)
        .with_poll_interval(Duration::from_secs(poll.max(1)));
    let engine = Arc::new(cachesync_client::SyncEngine::new(config));
    let mirror = engine.mirror();

    let runner = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.run().await }
    });

    // Report mirror contents whenever the observed state changes.
    let reporter = tokio::spawn(async move {
        let mut last_seen: Vec<_> = Vec::new();
        loop {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let items = mirror.list();
            if items != last_seen {
                for item in &items {
                    info!(
                        item = item.id,
                        version = item.version,
                        content = %item.content,
                        status = ?mirror.status(),
                        "mirrored"
                    );
                }
                last_seen = items;
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    engine.shutdown();
    reporter.abort();
    let _ = runner.await;
    Ok(())
}
