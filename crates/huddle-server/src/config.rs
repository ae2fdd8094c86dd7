//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Pending frames buffered per group before new ones are dropped.
    pub mailbox_capacity: usize,
    /// Close a connection when another attaches under its identity.
    pub close_superseded: bool,
    /// How long shutdown waits for connection tasks, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 1024 * 1024, // 1 MB
            mailbox_capacity: 256,
            close_superseded: true,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Relay tuning derived from this config.
    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            mailbox_capacity: self.mailbox_capacity.max(1),
            close_superseded: self.close_superseded,
        }
    }

    /// Shutdown grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Per-group relay tuning shared by every channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayOptions {
    /// Mailbox capacity (at least 1).
    pub mailbox_capacity: usize,
    /// Close superseded connections.
    pub close_superseded: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        ServerConfig::default().relay_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_and_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_mailbox_capacity() {
        assert_eq!(ServerConfig::default().mailbox_capacity, 256);
        assert_eq!(RelayOptions::default().mailbox_capacity, 256);
    }

    #[test]
    fn zero_mailbox_is_clamped() {
        let cfg = ServerConfig {
            mailbox_capacity: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.relay_options().mailbox_capacity, 1);
    }

    #[test]
    fn relay_options_carry_supersede_flag() {
        let cfg = ServerConfig {
            close_superseded: false,
            ..ServerConfig::default()
        };
        assert!(!cfg.relay_options().close_superseded);
    }

    #[test]
    fn shutdown_timeout_duration() {
        let cfg = ServerConfig {
            shutdown_timeout_secs: 3,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"10.0.0.1","port":3000,"max_message_size":512,"mailbox_capacity":8,"close_superseded":false,"shutdown_timeout_secs":1}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.mailbox_capacity, 8);
        assert!(!cfg.close_superseded);
    }
}
