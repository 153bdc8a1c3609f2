//! Veil VPN CLI
//!
//! Runs the split-tunnel engine against an externally provisioned TUN
//! device and tunnel transport. Session login and interface/route setup
//! happen outside this binary; it receives a ready TUN file descriptor
//! and a tunnel endpoint to connect to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use veil_engine::{
    Config, DnsService, FramedIo, LengthFramedIo, Resolver, Stack, TunStack, UdpForwarder,
};

/// Veil - split-tunnel VPN client
#[derive(Parser)]
#[command(name = "veil")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "veil.toml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tunnel engine
    Run {
        /// File descriptor of an already-open TUN device
        #[arg(long)]
        tun_fd: i32,

        /// Tunnel transport endpoint (host:port) of the established session
        #[arg(long)]
        server: String,
    },

    /// Generate a sample configuration file
    GenConfig {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "veil.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Run { tun_fd, server } => run(cli.config, tun_fd, server).await,
        Commands::GenConfig { output } => generate_config(output),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config_path: PathBuf, tun_fd: i32, server: String) -> Result<()> {
    info!("Starting Veil client...");

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {:?}", config_path))?;
    info!("Configuration loaded from {:?}", config_path);

    let tunnel_ip = config
        .engine
        .tunnel_ip
        .context("engine.tunnel_ip is required to run")?;

    let device = tun_device(tun_fd)?;
    let transport = tokio::net::TcpStream::connect(&server)
        .await
        .with_context(|| format!("Failed to connect tunnel transport {server}"))?;
    info!("Tunnel transport connected to {server}");

    // TCP gives no packet boundaries; the transport carries each packet
    // behind a length prefix.
    let stack = Arc::new(TunStack::new(
        device,
        Arc::new(LengthFramedIo::new(transport)),
        tunnel_ip,
        config.ip_resources.clone(),
    ));

    let resolver = Resolver::new(
        Arc::clone(&stack) as Arc<dyn Stack>,
        config.resolver_config(),
        config.domain_table(),
        config.dns_overrides.clone(),
    );
    let local_dns = config
        .engine
        .remote_dns_server
        .map(|ip| vec![ip.into()])
        .unwrap_or_default();
    stack.setup_resolve(Arc::new(DnsService::new(resolver, local_dns)));

    for spec in &config.udp_forwards {
        let forwarder = UdpForwarder::new(
            Arc::clone(&stack) as Arc<dyn Stack>,
            &spec.bind,
            spec.remote,
            config.engine.nat_timeout(),
            Default::default(),
        )
        .await
        .with_context(|| format!("Failed to bind UDP forward on {}", spec.bind))?;
        tokio::spawn(async move {
            if let Err(e) = forwarder.serve().await {
                error!("UDP forward terminated: {e}");
            }
        });
    }

    let runner = Arc::clone(&stack);
    let mut engine = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        _ = wait_for_shutdown() => {
            info!("Shutting down...");
            stack.shutdown();
            let _ = tokio::time::timeout(Duration::from_secs(5), engine).await;
            Ok(())
        }
        res = &mut engine => {
            let res = res.context("Engine task failed")?;
            res.context("Tunnel engine failed")
        }
    }
}

#[cfg(unix)]
fn tun_device(tun_fd: i32) -> Result<Arc<FramedIo<tokio::fs::File>>> {
    use std::os::unix::io::FromRawFd;

    if tun_fd < 0 {
        bail!("invalid TUN file descriptor {tun_fd}");
    }
    // Safety: the caller hands over sole ownership of this descriptor.
    let file = unsafe { std::fs::File::from_raw_fd(tun_fd) };
    Ok(Arc::new(FramedIo::new(tokio::fs::File::from_std(file))))
}

#[cfg(not(unix))]
fn tun_device(_tun_fd: i32) -> Result<Arc<FramedIo<tokio::fs::File>>> {
    bail!("--tun-fd is only supported on Unix platforms");
}

fn generate_config(output: PathBuf) -> Result<()> {
    let sample = Config::sample();

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;

    println!("Sample configuration written to {:?}", output);
    println!("\nEdit the rules and engine settings before running.");

    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to register SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C");
    }
}
