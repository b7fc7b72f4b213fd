use std::time::Duration;

use sluice_config::config::{Config, Listen};
use sluice_lb::{BackendPool, Dispatcher, FailoverPolicy, RotationPolicy};
use sluice_transport::uds_client::{BackendSettings, UdsBackend};

pub mod handler;
mod idle;
pub mod server;

pub use handler::handle;
pub use server::{ServeError, Server};

#[derive(Debug, Clone)]
pub struct EdgeSettings {
    /// Bound on reading one request head, and separately its body.
    pub read_timeout: Duration,
    /// A connection with no I/O for this long is closed.
    pub idle_timeout: Duration,
    /// How long shutdown waits for in-flight connections.
    pub shutdown_timeout: Duration,
}

impl EdgeSettings {
    pub fn from_config(listen: &Listen) -> Self {
        Self {
            read_timeout: Duration::from_millis(listen.read_timeout_ms),
            idle_timeout: Duration::from_millis(listen.idle_timeout_ms),
            shutdown_timeout: Duration::from_millis(listen.shutdown_timeout_ms),
        }
    }
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Builds one [`UdsBackend`] per configured socket, in config order.
pub fn backends_from_config(config: &Config) -> Vec<UdsBackend> {
    let upstream = &config.upstream;
    let client = &upstream.client;

    upstream
        .backends
        .iter()
        .map(|backend| {
            let settings = BackendSettings {
                host: upstream.host.clone(),
                max_conns: backend.max_conns(client),
                max_conn_wait: Duration::from_millis(client.max_conn_wait_ms),
                max_idle_conn: Duration::from_millis(client.max_idle_conn_ms),
                read_timeout: Duration::from_millis(client.read_timeout_ms),
                write_timeout: Duration::from_millis(client.write_timeout_ms),
            };
            UdsBackend::new(backend.socket(), settings)
        })
        .collect()
}

pub fn dispatcher_from_config(config: &Config) -> Result<Dispatcher<UdsBackend>, String> {
    let rotation = RotationPolicy::from_config(&config.upstream.rotation)?;
    let failover = FailoverPolicy::from_config(&config.upstream.failover)?;
    let pool = BackendPool::new(backends_from_config(config));

    Ok(Dispatcher::new(pool, rotation, failover))
}
