//! Client configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use rmtdos_core::{DEFAULT_ETHERTYPE, MacAddr, RmtError};

/// Top-level configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Watch mode settings.
    pub watch: WatchConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local UDP address to bind.
    pub bind: String,
    /// Server link adapter address. Unicast frames are sent here.
    pub server: String,
    /// Where discovery requests are sent.
    pub broadcast: String,
    /// This station's link identity, `aa:bb:cc:dd:ee:ff`.
    pub identity: String,
    /// Link type tag.
    pub ethertype: u16,
    /// How long to wait for replies, in milliseconds.
    pub timeout_ms: u64,
}

/// Watch mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Interval between session refreshes. Must stay below the server's
    /// session lifetime.
    pub keepalive_ms: u64,
    /// Send Enter after each forwarded stdin line.
    pub newline: bool,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:0".into(),
            server: "127.0.0.1:8055".into(),
            broadcast: "255.255.255.255:8055".into(),
            identity: "02:00:00:00:42:01".into(),
            ethertype: DEFAULT_ETHERTYPE,
            timeout_ms: 1000,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            keepalive_ms: 1000,
            newline: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, RmtError> {
        parse_addr("bind", &self.network.bind)
    }

    pub fn server_addr(&self) -> Result<SocketAddr, RmtError> {
        parse_addr("server", &self.network.server)
    }

    pub fn broadcast_addr(&self) -> Result<SocketAddr, RmtError> {
        parse_addr("broadcast", &self.network.broadcast)
    }

    pub fn identity(&self) -> Result<MacAddr, RmtError> {
        let identity: MacAddr = self.network.identity.parse()?;
        if identity.is_broadcast() || identity.is_zero() {
            return Err(RmtError::InvalidConfig(format!(
                "identity {identity} cannot be used by a station"
            )));
        }
        Ok(identity)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.network.timeout_ms.max(1))
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.watch.keepalive_ms.max(10))
    }
}

fn parse_addr(field: &str, text: &str) -> Result<SocketAddr, RmtError> {
    text.parse()
        .map_err(|e| RmtError::InvalidConfig(format!("{field} address {text:?}: {e}")))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("server"));
        assert!(text.contains("keepalive_ms"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.server, "127.0.0.1:8055");
        assert_eq!(parsed.network.ethertype, 0x80ab);
        assert_eq!(parsed.keepalive(), Duration::from_secs(1));
    }

    #[test]
    fn addresses_and_identity_are_validated() {
        let mut cfg = ClientConfig::default();
        assert!(cfg.server_addr().is_ok());
        assert_eq!(cfg.identity().unwrap(), MacAddr([2, 0, 0, 0, 0x42, 1]));

        cfg.network.server = "nowhere".into();
        assert!(matches!(cfg.server_addr(), Err(RmtError::InvalidConfig(_))));
        cfg.network.identity = "00:00:00:00:00:00".into();
        assert!(cfg.identity().is_err());
    }
}
