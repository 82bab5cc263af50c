//! Protocol message type definitions.
//!
//! Uses a proper enum with `TryFrom`, so unknown values are an error rather than a panic.

use crate::error::RmtError;
use std::fmt;

// ── MessageType ──────────────────────────────────────────────────

/// Every message type carried in the protocol header's type field.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Placeholder; accepted on the wire, never acted on.
    Noop = 0,

    /// Liveness probe. Payload is arbitrary and echoed back.
    Ping = 1,

    /// Reply to [`MessageType::Ping`].
    Pong = 2,

    /// Discovery probe, usually sent to the link broadcast identity.
    StatusRequest = 3,

    /// Reply to [`MessageType::StatusRequest`]. Payload is a `StatusResponse`.
    StatusResponse = 4,

    /// Open or refresh a remote-control session. Peers resend this every
    /// few seconds; the server forgets sessions that stop refreshing.
    SessionStart = 5,

    /// A slice of the text display. Payload is a `ScreenChunk`.
    ScreenChunk = 6,

    /// One or more keystroke records to inject into the host input queue.
    InjectKeystroke = 7,
}

impl TryFrom<u16> for MessageType {
    type Error = RmtError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Noop),
            1 => Ok(MessageType::Ping),
            2 => Ok(MessageType::Pong),
            3 => Ok(MessageType::StatusRequest),
            4 => Ok(MessageType::StatusResponse),
            5 => Ok(MessageType::SessionStart),
            6 => Ok(MessageType::ScreenChunk),
            7 => Ok(MessageType::InjectKeystroke),
            _ => Err(RmtError::UnknownVariant {
                type_name: "MessageType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl MessageType {
    /// Returns `true` if the frame is only honoured when its
    /// (source identity, nonce) pair names a live session.
    pub fn requires_session(&self) -> bool {
        matches!(self, MessageType::InjectKeystroke)
    }

    /// Returns `true` for types that only the server originates. The
    /// dispatcher never routes these.
    pub fn is_server_originated(&self) -> bool {
        matches!(
            self,
            MessageType::Pong | MessageType::StatusResponse | MessageType::ScreenChunk
        )
    }
}
