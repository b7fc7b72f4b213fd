use crate::config::{Backend, Client, Listen, Log, Startup, Upstream};

// default values
pub fn get_default_port() -> u32 {
    80
}

pub fn get_default_address() -> String {
    String::from("0.0.0.0")
}

pub fn get_default_read_timeout_ms() -> u64 {
    5000
}

pub fn get_default_write_timeout_ms() -> u64 {
    5000
}

pub fn get_default_idle_timeout_ms() -> u64 {
    120_000
}

pub fn get_default_shutdown_timeout_ms() -> u64 {
    10_000
}

pub fn get_default_upstream_host() -> String {
    String::from("localhost")
}

pub fn get_default_rotation() -> String {
    String::from("modulo")
}

pub fn get_default_failover() -> String {
    String::from("pair")
}

pub fn get_default_backends() -> Vec<Backend> {
    vec![
        Backend::Simple(String::from("/tmp/rinhex/api1.sock")),
        Backend::Simple(String::from("/tmp/rinhex/api2.sock")),
    ]
}

pub fn get_default_max_conns() -> usize {
    100
}

pub fn get_default_max_conn_wait_ms() -> u64 {
    200
}

pub fn get_default_max_idle_conn_ms() -> u64 {
    15_000
}

pub fn get_default_wait_attempts() -> u32 {
    30
}

pub fn get_default_wait_interval_ms() -> u64 {
    1000
}

pub fn get_default_log_level() -> String {
    String::from("info")
}

pub fn get_default_listen() -> Listen {
    Listen {
        address: get_default_address(),
        port: get_default_port(),
        read_timeout_ms: get_default_read_timeout_ms(),
        idle_timeout_ms: get_default_idle_timeout_ms(),
        shutdown_timeout_ms: get_default_shutdown_timeout_ms(),
    }
}

pub fn get_default_client() -> Client {
    Client {
        max_conns: get_default_max_conns(),
        max_conn_wait_ms: get_default_max_conn_wait_ms(),
        max_idle_conn_ms: get_default_max_idle_conn_ms(),
        read_timeout_ms: get_default_read_timeout_ms(),
        write_timeout_ms: get_default_write_timeout_ms(),
    }
}

pub fn get_default_upstream() -> Upstream {
    Upstream {
        host: get_default_upstream_host(),
        rotation: get_default_rotation(),
        failover: get_default_failover(),
        backends: get_default_backends(),
        client: get_default_client(),
    }
}

pub fn get_default_startup() -> Startup {
    Startup {
        wait_attempts: get_default_wait_attempts(),
        wait_interval_ms: get_default_wait_interval_ms(),
    }
}

pub fn get_default_log() -> Log {
    Log {
        level: get_default_log_level(),
    }
}
