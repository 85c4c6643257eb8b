//! Parses the command line and runs a router from its configuration files.
//!
//! Running a router on static routes only, with JSON logs:
//!
//! ```text
//! vrouter --interfaces r1.interfaces --routes r1.routes --arp r1.arp --no-rip --log
//! ```

use crate::{parsing::Config, udp_transport::UdpTransport};
use clap::Parser;
use std::{
    fs::{create_dir_all, OpenOptions},
    io,
    path::PathBuf,
    sync::Arc,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vrouter_core::{ExitStatus, Router, Shutdown};

/// A software IPv4 router that learns routes with RIPv2.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// The interfaces file: `<name> <ip>/<len> <mac> <bind> <peer>` per line
    #[arg(short, long)]
    pub interfaces: PathBuf,
    /// The static routes file: `<destination> <gateway> <mask> <interface> [<metric>]`
    #[arg(short, long)]
    pub routes: Option<PathBuf>,
    /// The static ARP file: `<ip> <mac>` per line
    #[arg(short, long)]
    pub arp: PathBuf,
    /// Route with connected and static routes only
    #[arg(long)]
    pub no_rip: bool,
    /// Write JSON logs to ./logs instead of logging to stderr
    #[arg(short, long)]
    pub log: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] crate::parsing::ConfigError),
    #[error("Could not open the links: {0}")]
    Link(io::Error),
    #[error("Could not set up logging: {0}")]
    Logging(String),
}

/// Parses the process arguments and runs the router they describe.
pub async fn initialize_from_arguments() -> Result<ExitStatus, CliError> {
    run(Args::parse()).await
}

/// Runs a router until Ctrl-C.
pub async fn run(args: Args) -> Result<ExitStatus, CliError> {
    initialize_logging(args.log)?;
    let config = Config::load(&args.interfaces, args.routes.as_deref(), &args.arp)?;
    let (transport, deliveries) = UdpTransport::bind(&config)
        .await
        .map_err(CliError::Link)?;
    let router = Arc::new(Router::new(
        Arc::new(transport),
        config.arp_cache(),
        !args.no_rip,
    ));
    config.install_routes(&router);
    tracing::info!("Static route table:\n{}", router.table());
    tracing::info!("ARP cache:\n{}", router.arp());

    let shutdown = Shutdown::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => shutdown.shut_down(),
                Err(e) => tracing::error!("Could not listen for Ctrl-C: {}", e),
            }
        }
    });
    Ok(router.run(deliveries, shutdown).await)
}

/// Installs the global subscriber. Human readable events go to stderr,
/// filtered by `RUST_LOG` and defaulting to `info`. With `to_file` set,
/// every event is written as JSON to a timestamped file in `./logs`.
fn initialize_logging(to_file: bool) -> Result<(), CliError> {
    let result = if to_file {
        let main_path = "./logs";
        create_dir_all(main_path).map_err(|e| CliError::Logging(e.to_string()))?;
        let file_path = format!(
            "{}/vrouter-{}.log",
            main_path,
            chrono::offset::Local::now().format("%y-%m-%d_%H-%M-%S")
        );
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(file_path)
            .map_err(|e| CliError::Logging(e.to_string()))?;
        let subscriber = FmtSubscriber::builder()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(Arc::new(file))
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    };
    result.map_err(|e| CliError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments() {
        Args::command().debug_assert();
        let args = Args::parse_from([
            "vrouter",
            "--interfaces",
            "r1.interfaces",
            "-a",
            "r1.arp",
            "--no-rip",
        ]);
        assert_eq!(args.interfaces, PathBuf::from("r1.interfaces"));
        assert_eq!(args.routes, None);
        assert!(args.no_rip);
        assert!(!args.log);
        assert!(Args::try_parse_from(["vrouter", "--arp", "r1.arp"]).is_err());
    }
}
