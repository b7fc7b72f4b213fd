use std::collections::HashSet;

use log::{error, info};

use crate::{config::Config, error::ConfigError};

pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

pub const VALID_ROTATIONS: &[&str] = &["modulo", "round-robin", "round_robin", "rr", "parity"];

pub const VALID_FAILOVER: &[&str] = &["pair", "next", "off", "none", "disabled"];

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    info!("Starting configuration validation...");

    match check(config) {
        Ok(()) => {
            info!("Configuration validation passed successfully");
            Ok(())
        }
        Err(reason) => {
            error!("{}", reason);
            Err(ConfigError::Invalid(reason))
        }
    }
}

fn check(config: &Config) -> Result<(), String> {
    // --- Validate log level ---
    if !VALID_LOG_LEVELS
        .iter()
        .any(|lvl| lvl.eq_ignore_ascii_case(&config.log.level))
    {
        return Err(format!("Invalid log level: {}", config.log.level));
    }

    // --- Validate listen address ---
    if config.listen.address.is_empty() {
        return Err("Listen address is empty".to_string());
    }

    if config.listen.port == 0 || config.listen.port > 65535 {
        return Err(format!(
            "Invalid listen port: {} (must be between 1 and 65535)",
            config.listen.port
        ));
    }

    if config.listen.read_timeout_ms == 0 {
        return Err("Listen read timeout is invalid (0)".to_string());
    }

    if config.listen.idle_timeout_ms == 0 {
        return Err("Listen idle timeout is invalid (0)".to_string());
    }

    if config.listen.shutdown_timeout_ms == 0 {
        return Err("Listen shutdown timeout is invalid (0)".to_string());
    }

    // --- Validate upstream ---
    let upstream = &config.upstream;

    if upstream.host.is_empty() {
        return Err("Upstream host is empty".to_string());
    }

    if !VALID_ROTATIONS
        .iter()
        .any(|r| r.eq_ignore_ascii_case(&upstream.rotation))
    {
        return Err(format!("Invalid rotation: {}", upstream.rotation));
    }

    if !VALID_FAILOVER
        .iter()
        .any(|f| f.eq_ignore_ascii_case(&upstream.failover))
    {
        return Err(format!("Invalid failover policy: {}", upstream.failover));
    }

    if upstream.backends.is_empty() {
        return Err("No backends configured".to_string());
    }

    if upstream.rotation.eq_ignore_ascii_case("parity") && upstream.backends.len() != 2 {
        return Err(format!(
            "Parity rotation needs exactly 2 backends, found {}",
            upstream.backends.len()
        ));
    }

    let mut seen = HashSet::new();
    for backend in &upstream.backends {
        let socket = backend.socket();
        if socket.is_empty() {
            return Err("Backend socket path is missing".to_string());
        }

        if !seen.insert(socket) {
            return Err(format!("Backend socket '{}' is listed twice", socket));
        }

        if backend.max_conns(&upstream.client) == 0 {
            return Err(format!(
                "Backend max_conns is invalid (0) for socket '{}'",
                socket
            ));
        }
    }

    let client = &upstream.client;
    if client.max_conn_wait_ms == 0 {
        return Err("Client max_conn_wait_ms is invalid (0)".to_string());
    }

    if client.max_idle_conn_ms == 0 {
        return Err("Client max_idle_conn_ms is invalid (0)".to_string());
    }

    if client.read_timeout_ms == 0 || client.write_timeout_ms == 0 {
        return Err("Client read/write timeouts must be greater than 0".to_string());
    }

    // --- Validate startup gate ---
    if config.startup.wait_attempts == 0 {
        return Err("Startup wait attempts is invalid (0)".to_string());
    }

    if config.startup.wait_interval_ms == 0 {
        return Err("Startup wait interval is invalid (0)".to_string());
    }

    Ok(())
}
