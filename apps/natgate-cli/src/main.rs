//! natgate - command-line client for UPnP gateway port mapping.
//!
//! `natgate discover` shows which gateway answers and where its WAN services
//! live. `natgate map` opens a port, keeps it open until Ctrl+C, then closes
//! it again.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use natgate_core::upnp::DiscoveryTransport;
use natgate_core::{ErrorCode, PortMapper, Protocol, UpnpClient, WanService};

use crate::config::CliConfig;

/// natgate - Open and close NAT port mappings on a UPnP gateway.
#[derive(Parser, Debug)]
#[command(name = "natgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(
        short,
        long,
        default_value = "info",
        env = "NATGATE_LOG_LEVEL",
        global = true
    )]
    log_level: log::LevelFilter,

    /// SSDP search target (overrides config file).
    #[arg(long, global = true)]
    search_target: Option<String>,

    /// Seconds a gateway may wait before answering (overrides config file).
    #[arg(long, global = true)]
    mx: Option<u8>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find a gateway and list its WAN connection services.
    Discover,

    /// Map a port until interrupted with Ctrl+C.
    Map {
        /// Transport protocol (tcp or udp).
        #[arg(long, default_value = "tcp")]
        protocol: Protocol,

        /// Internal port to forward to.
        #[arg(short, long)]
        port: u16,

        /// External port to open (defaults to the internal port).
        #[arg(short, long)]
        external_port: Option<u16>,

        /// Internal client address (overrides config file).
        #[arg(long)]
        client: Option<IpAddr>,

        /// Mapping description (overrides config file).
        #[arg(short, long)]
        description: Option<String>,
    },
}

/// Turns a library error into an `anyhow` error headed by its error code.
fn coded<E>(err: E) -> anyhow::Error
where
    E: ErrorCode + std::error::Error + Send + Sync + 'static,
{
    let code = err.code();
    anyhow::Error::new(err).context(code)
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::debug!("natgate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        CliConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(target) = args.search_target {
        config.search.search_target = target;
    }
    if let Some(mx) = args.mx {
        config.search.mx = mx;
    }

    match args.command {
        Command::Discover => discover(&config),
        Command::Map {
            protocol,
            port,
            external_port,
            client,
            description,
        } => {
            if let Some(client) = client {
                config.internal_client = Some(client);
            }
            if let Some(description) = description {
                config.description = description;
            }
            map(&config, protocol, port, external_port)
        }
    }
}

fn discover(config: &CliConfig) -> Result<()> {
    let client = UpnpClient::new()
        .map_err(coded)
        .context("Failed to set up HTTP client")?;

    let location = client
        .discover(&config.search)
        .map_err(coded)
        .context("No gateway answered the search")?;
    println!("Gateway: {}", location);

    let endpoints = client
        .resolve_control_urls(&location, &WanService::all_urns())
        .map_err(coded)
        .context("Failed to read device description")?;

    if endpoints.is_empty() {
        println!("No WAN connection service found");
    }
    for service in WanService::PREFERENCE_ORDER {
        if let Some(endpoint) = endpoints.get(service.urn()) {
            println!("  {}: {}", service.name(), endpoint.control_url);
        }
    }
    Ok(())
}

fn map(
    config: &CliConfig,
    protocol: Protocol,
    port: u16,
    external_port: Option<u16>,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    let mapper = PortMapper::native()
        .map_err(coded)
        .context("Failed to set up gateway client")?;

    let request = config.to_request(protocol, port, external_port);
    let mapping = mapper
        .create(&request)
        .map_err(coded)
        .context("Failed to create port mapping")?;
    println!("Mapped {}", mapping);

    match mapping.external_ip_address() {
        Ok(ip) => println!("Reachable at {}:{}", ip, mapping.external_port()),
        Err(e) => log::warn!("Could not read external address ({}): {}", e.code(), e),
    }

    println!("Press Ctrl+C to remove the mapping");
    rx.recv().context("Ctrl+C handler disconnected")?;

    log::info!("Shutdown signal received, removing mapping...");
    mapping
        .delete()
        .map_err(coded)
        .context("Failed to remove port mapping")?;
    println!("Removed {}", mapping);
    Ok(())
}
