use serde::{Deserialize, Serialize};

use crate::default::{
    get_default_address, get_default_backends, get_default_client, get_default_failover,
    get_default_idle_timeout_ms, get_default_listen, get_default_log, get_default_log_level,
    get_default_max_conn_wait_ms, get_default_max_conns, get_default_max_idle_conn_ms,
    get_default_port, get_default_read_timeout_ms, get_default_rotation,
    get_default_shutdown_timeout_ms, get_default_startup, get_default_upstream, get_default_upstream_host, get_default_wait_attempts,
    get_default_wait_interval_ms, get_default_write_timeout_ms,
};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "get_default_listen")]
    pub listen: Listen,

    #[serde(default = "get_default_upstream")]
    pub upstream: Upstream,

    #[serde(default = "get_default_startup")]
    pub startup: Startup,

    #[serde(default = "get_default_log")]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: get_default_listen(),
            upstream: get_default_upstream(),
            startup: get_default_startup(),
            log: get_default_log(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Listen {
    #[serde(default = "get_default_address")]
    pub address: String, // "0.0.0.0"

    #[serde(default = "get_default_port")]
    pub port: u32, // 80

    // bound on reading one request head or body
    #[serde(default = "get_default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    // connection closed after this long without any I/O
    #[serde(default = "get_default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    // how long Ctrl-C waits for in-flight connections
    #[serde(default = "get_default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Listen {
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Upstream {
    // host/authority written into every forwarded request
    #[serde(default = "get_default_upstream_host")]
    pub host: String,

    #[serde(default = "get_default_rotation")]
    pub rotation: String, // modulo | parity

    #[serde(default = "get_default_failover")]
    pub failover: String, // pair | next | off

    #[serde(default = "get_default_backends")]
    pub backends: Vec<Backend>,

    #[serde(default = "get_default_client")]
    pub client: Client,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Backend {
    Simple(String),
    Full {
        socket: String,

        #[serde(default)]
        max_conns: Option<usize>,
    },
}

impl Backend {
    pub fn socket(&self) -> &str {
        match self {
            Backend::Simple(socket) => socket,
            Backend::Full { socket, .. } => socket,
        }
    }

    /// Per-backend connection cap, falling back to the shared client setting.
    pub fn max_conns(&self, client: &Client) -> usize {
        match self {
            Backend::Full {
                max_conns: Some(max),
                ..
            } => *max,
            _ => client.max_conns,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Client {
    #[serde(default = "get_default_max_conns")]
    pub max_conns: usize,

    #[serde(default = "get_default_max_conn_wait_ms")]
    pub max_conn_wait_ms: u64,

    #[serde(default = "get_default_max_idle_conn_ms")]
    pub max_idle_conn_ms: u64,

    #[serde(default = "get_default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "get_default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Startup {
    #[serde(default = "get_default_wait_attempts")]
    pub wait_attempts: u32,

    #[serde(default = "get_default_wait_interval_ms")]
    pub wait_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Log {
    #[serde(default = "get_default_log_level")]
    pub level: String, // "trace, debug, info, warn, error, off"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_reference_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.listen.socket_address(), "0.0.0.0:80");
        assert_eq!(config.upstream.backends.len(), 2);
        assert_eq!(config.upstream.backends[0].socket(), "/tmp/rinhex/api1.sock");
        assert_eq!(config.upstream.client.max_conns, 100);
        assert_eq!(config.upstream.client.max_conn_wait_ms, 200);
        assert_eq!(config.startup.wait_attempts, 30);
        assert_eq!(config.startup.wait_interval_ms, 1000);
        assert_eq!(config.upstream.failover, "pair");
        assert_eq!(config.listen.shutdown_timeout_ms, 10_000);
    }

    #[test]
    fn backends_accept_plain_and_full_forms() {
        let yaml = r#"
upstream:
  backends:
    - /run/a.sock
    - socket: /run/b.sock
      max_conns: 4
  client:
    max_conns: 16
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let client = &config.upstream.client;
        let backends = &config.upstream.backends;

        assert_eq!(backends[0].socket(), "/run/a.sock");
        assert_eq!(backends[0].max_conns(client), 16);
        assert_eq!(backends[1].socket(), "/run/b.sock");
        assert_eq!(backends[1].max_conns(client), 4);
        assert_eq!(client.max_conn_wait_ms, 200);
    }
}
