//! Domain-specific error types for the rmtdos protocol.
//!
//! All fallible operations return `Result<T, RmtError>`.
//! Foreign or malformed frames never panic; every rejection is typed.

use thiserror::Error;

/// The canonical error type for the rmtdos protocol.
#[derive(Debug, Error)]
pub enum RmtError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The protocol header does not carry the rmtdos signature.
    #[error("invalid signature: {0:#010x}")]
    InvalidSignature(u32),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// Fewer bytes than a complete header (or payload record) were received.
    #[error("frame too short: need {needed} bytes, got {actual}")]
    FrameTooShort { needed: usize, actual: usize },

    /// A connection-oriented message arrived for a session we do not hold.
    #[error("no session for nonce {0:#010x}")]
    UnknownSession(u32),

    // ── Packet Errors ────────────────────────────────────────────
    /// The payload exceeds what fits in a single frame.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The frame exceeds the link MTU or a pool slot.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Resource Errors ──────────────────────────────────────────
    /// Every buffer in the pool is in flight.
    #[error("buffer pool exhausted")]
    PoolExhausted,

    /// Every session slot is taken.
    #[error("session table full ({0} slots)")]
    SessionTableFull(usize),

    // ── Transport Errors ─────────────────────────────────────────
    /// The link layer refused or failed a transmit.
    #[error("transmit failed: {0}")]
    Transmit(#[from] std::io::Error),

    // ── Configuration Errors ─────────────────────────────────────
    /// A startup parameter cannot be honoured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl RmtError {
    /// Returns `true` for errors that mean "drop it and count it" rather
    /// than a fault worth surfacing.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::PoolExhausted | Self::SessionTableFull(_))
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for RmtError {
    fn from(s: String) -> Self {
        RmtError::Other(s)
    }
}

impl From<&str> for RmtError {
    fn from(s: &str) -> Self {
        RmtError::Other(s.to_string())
    }
}
