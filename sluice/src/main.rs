//! sluice - HTTP load balancer for workers behind Unix sockets.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use log::{error, info};

use sluice_config::{config::Backend, config::Config, validator::validate as validate_config};
use sluice_edge::{EdgeSettings, Server, dispatcher_from_config};
use sluice_transport::readiness::await_all_ready;

#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML config file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, `host:port` or `:port`
    #[arg(long)]
    addr: Option<String>,

    /// Backend socket path, repeat once per backend
    #[arg(long = "socket")]
    sockets: Vec<String>,

    /// Max concurrent connections per backend
    #[arg(long)]
    maxconns: Option<usize>,

    /// Startup polls per backend socket
    #[arg(long)]
    wait_attempts: Option<u32>,

    /// Delay between startup polls, in milliseconds
    #[arg(long)]
    wait_interval_ms: Option<u64>,

    #[arg(long)]
    log_level: Option<String>,
}

fn parse_listen_addr(addr: &str) -> Result<(String, u32), String> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("listen address '{addr}' has no port"))?;
    let port = port
        .parse::<u32>()
        .map_err(|_| format!("invalid port in listen address '{addr}'"))?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };

    Ok((host.to_string(), port))
}

/// Command line flags win over the config file.
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<(), String> {
    if let Some(addr) = &cli.addr {
        let (address, port) = parse_listen_addr(addr)?;
        config.listen.address = address;
        config.listen.port = port;
    }

    if !cli.sockets.is_empty() {
        config.upstream.backends = cli.sockets.iter().cloned().map(Backend::Simple).collect();
    }

    if let Some(max_conns) = cli.maxconns {
        config.upstream.client.max_conns = max_conns;
        for backend in &mut config.upstream.backends {
            if let Backend::Full { max_conns: cap, .. } = backend {
                *cap = None;
            }
        }
    }

    if let Some(attempts) = cli.wait_attempts {
        config.startup.wait_attempts = attempts;
    }

    if let Some(interval) = cli.wait_interval_ms {
        config.startup.wait_interval_ms = interval;
    }

    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match sluice_config::loader::read_config(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                eprintln!("Error loading config: {}", err);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Err(err) = apply_overrides(&mut config, &cli) {
        eprintln!("Error in arguments: {}", err);
        std::process::exit(1);
    }

    sluice_utils::logger::init_logger(&config.log.level);

    if validate_config(&config).is_err() {
        error!("Configuration validation failed. Exiting...");
        std::process::exit(1);
    }

    let sockets: Vec<PathBuf> = config
        .upstream
        .backends
        .iter()
        .map(|backend| PathBuf::from(backend.socket()))
        .collect();

    let readiness = await_all_ready(
        &sockets,
        config.startup.wait_attempts,
        Duration::from_millis(config.startup.wait_interval_ms),
    )
    .await;
    let ready = readiness.iter().filter(|r| r.is_ready()).count();
    if ready < sockets.len() {
        info!(
            "{} of {} backends ready, starting degraded",
            ready,
            sockets.len()
        );
    }

    let dispatcher = match dispatcher_from_config(&config) {
        Ok(dispatcher) => Arc::new(dispatcher),
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    };

    let listen_addr = config.listen.socket_address();
    info!(
        "LB on {} (workers={})",
        listen_addr,
        std::thread::available_parallelism().map_or(1, |n| n.get())
    );
    info!(
        "Backends: {} (maxconns={}, rotation={}, failover={})",
        config
            .upstream
            .backends
            .iter()
            .map(|b| b.socket())
            .collect::<Vec<_>>()
            .join(", "),
        config.upstream.client.max_conns,
        dispatcher.rotation().policy().name(),
        dispatcher.failover().name()
    );

    let server = match Server::bind(
        &listen_addr,
        dispatcher,
        EdgeSettings::from_config(&config.listen),
    )
    .await
    {
        Ok(server) => server,
        Err(err) => {
            error!("Error starting server: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = server.run_until(shutdown_signal()).await {
        error!("Server error: {}", err);
        std::process::exit(1);
    }
}
