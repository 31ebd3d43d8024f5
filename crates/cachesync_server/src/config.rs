//! Server configuration.

use std::net::SocketAddr;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Port 0 picks an ephemeral port; the bound
    /// address is reported by the server handle.
    pub bind_addr: SocketAddr,
    /// Change-feed buffer per session. A session further behind than this
    /// misses push notifications and catches up on its client's next poll.
    pub feed_capacity: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            feed_capacity: 1024,
        }
    }

    /// Sets the change-feed buffer size.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 7450)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.feed_capacity, 1024);
        assert_eq!(config.bind_addr.port(), 7450);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:0".parse().unwrap()).with_feed_capacity(64);
        assert_eq!(config.feed_capacity, 64);
        assert_eq!(config.bind_addr.port(), 0);
    }
}
