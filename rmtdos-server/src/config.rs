//! Configuration for the rmtdos server.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use rmtdos_core::buffer::{DEFAULT_BUFFERS, MAX_BUFFERS};
use rmtdos_core::display::TEXT_MODE;
use rmtdos_core::engine::DEFAULT_SESSION_LIFETIME;
use rmtdos_core::session::DEFAULT_SESSIONS;
use rmtdos_core::{DEFAULT_ETHERTYPE, EngineConfig, MAX_FRAME_LEN, MacAddr, RmtError};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Link adapter settings.
    pub network: NetworkConfig,
    /// Engine sizing and timing.
    pub engine: EngineSection,
    /// The in-memory display served to clients.
    pub screen: ScreenConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Link adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP address the link adapter binds.
    pub bind: String,
    /// Where frames for the broadcast identity are sent.
    pub broadcast: String,
    /// This station's link identity, `aa:bb:cc:dd:ee:ff`.
    pub identity: String,
    /// Link type tag; frames carrying any other are dropped on receipt.
    pub ethertype: u16,
}

/// Engine sizing and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Receive buffers (1 to 10).
    pub buffers: usize,
    /// Concurrent sessions.
    pub sessions: usize,
    /// Idle time before a session is dropped.
    pub session_lifetime_ms: u64,
    /// Period of the streaming tick.
    pub tick_interval_ms: u64,
    /// Largest frame transmitted.
    pub mtu: usize,
}

/// The display served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub rows: u8,
    pub cols: u8,
    /// Video mode reported in StatusResponse.
    pub mode: u8,
    /// Text written to the display at startup.
    pub banner: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8055".into(),
            broadcast: "255.255.255.255:8055".into(),
            identity: "02:00:00:00:80:ab".into(),
            ethertype: DEFAULT_ETHERTYPE,
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            buffers: DEFAULT_BUFFERS,
            sessions: DEFAULT_SESSIONS,
            session_lifetime_ms: DEFAULT_SESSION_LIFETIME,
            tick_interval_ms: 55,
            mtu: MAX_FRAME_LEN,
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            rows: 25,
            cols: 80,
            mode: TEXT_MODE,
            banner: "rmtdos server ready\n".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
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

    /// Pool size clamped to what the pool supports.
    pub fn buffers(&self) -> usize {
        self.engine.buffers.clamp(1, MAX_BUFFERS)
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.engine.tick_interval_ms.max(1)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            ethertype: self.network.ethertype,
            mtu: self.engine.mtu,
            session_lifetime: self.engine.session_lifetime_ms,
            sessions: self.engine.sessions.max(1),
        }
    }
}

fn parse_addr(field: &str, text: &str) -> Result<SocketAddr, RmtError> {
    text.parse()
        .map_err(|e| RmtError::InvalidConfig(format!("{field} address {text:?}: {e}")))
}

// ── Tests ────────────────────────────────────────────────────────
