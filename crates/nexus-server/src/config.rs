//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the relay starts with zero configuration
//! for local development.

use std::net::SocketAddr;

use nexus_shared::constants::{
    APP_NAME, DEFAULT_HTTP_PORT, DEFAULT_HUB_QUEUE, DEFAULT_OUTBOUND_QUEUE,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP and WebSocket listener.
    /// Env: `HTTP_ADDR`, with `PORT` overriding only the port.
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// Origins allowed by CORS. A single `*` allows any origin.
    /// Env: `CORS_ORIGIN` (comma separated)
    /// Default: the local web client dev servers.
    pub cors_origins: Vec<String>,

    /// Human-readable name reported by `/info`.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,

    /// Per-connection outbound queue length. Events for a client whose
    /// queue is full are dropped.
    /// Env: `OUTBOUND_QUEUE`
    pub outbound_queue: usize,

    /// Capacity of the hub command channel.
    /// Env: `HUB_QUEUE`
    pub hub_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            instance_name: APP_NAME.to_string(),
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            hub_queue: DEFAULT_HUB_QUEUE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(port) = lookup("PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.http_addr.set_port(parsed);
            } else {
                tracing::warn!(value = %port, "Invalid PORT, ignoring");
            }
        }

        if let Some(origins) = lookup("CORS_ORIGIN") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            if parsed.is_empty() {
                tracing::warn!("Empty CORS_ORIGIN, using default");
            } else {
                config.cors_origins = parsed;
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        if let Some(val) = lookup("OUTBOUND_QUEUE") {
            match parse_capacity(&val) {
                Some(n) => config.outbound_queue = n,
                None => tracing::warn!(value = %val, "Invalid OUTBOUND_QUEUE, using default"),
            }
        }

        if let Some(val) = lookup("HUB_QUEUE") {
            match parse_capacity(&val) {
                Some(n) => config.hub_queue = n,
                None => tracing::warn!(value = %val, "Invalid HUB_QUEUE, using default"),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    /// Whether CORS should allow every origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

/// Channel capacities must be non-zero; tokio panics otherwise.
fn parse_capacity(val: &str) -> Option<usize> {
    val.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.outbound_queue, 256);
        assert!(!config.allows_any_origin());
    }

    #[test]
    fn test_port_overrides_only_the_port() {
        let config = config_from(&[("HTTP_ADDR", "127.0.0.1:8080"), ("PORT", "9000")]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("OUTBOUND_QUEUE", "0"),
            ("HUB_QUEUE", "lots"),
        ]);
        let defaults = ServerConfig::default();
        assert_eq!(config.http_addr, defaults.http_addr);
        assert_eq!(config.outbound_queue, defaults.outbound_queue);
        assert_eq!(config.hub_queue, defaults.hub_queue);
    }

    #[test]
    fn test_cors_origin_list() {
        let config = config_from(&[("CORS_ORIGIN", "https://a.example, https://b.example,")]);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );

        assert!(config_from(&[("CORS_ORIGIN", "*")]).allows_any_origin());
    }
}
