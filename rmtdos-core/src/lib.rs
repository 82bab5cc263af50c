//! # rmtdos-core
//!
//! Server engine and wire protocol for rmtdos, a remote text screen and
//! keyboard carried in raw link-layer frames.
//!
//! This crate contains:
//! - **Wire format**: `LinkHeader`, `ProtocolHeader`, `FrameView`, `FrameWriter`, `Frame`
//! - **Payloads**: `StatusResponse`, `ScreenChunkHeader`, `Keystroke`
//! - **Buffer pool**: `BufferPool`, shared between the link receiver and the mainline
//! - **Sessions**: `SessionTable`, bounded and reaped on idle
//! - **Engine**: `Engine`, which dispatches received frames and streams the screen
//! - **Host interfaces**: `Link`, `TextDisplay`, `KeyInjector`, `Clock`
//! - **Client helpers**: `FrameCodec` for `tokio_util`, `ScreenMirror`
//! - **Error**: `RmtError`, typed, `thiserror`-based

pub mod buffer;
pub mod codec;
pub mod display;
pub mod engine;
pub mod error;
pub mod flags;
pub mod header;
pub mod host;
pub mod message;
pub mod packet;
pub mod protocol;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use buffer::{BufferPool, BufferState, PendingBuffer, PoolCensus, ReadyBuffer};
pub use codec::FrameCodec;
pub use display::{DisplayState, TextDisplay, TextScreen};
pub use engine::{Engine, EngineConfig, EngineStats, TickOutcome};
pub use error::RmtError;
pub use flags::KeyFlags;
pub use header::{
    COMBINED_HEADER_LEN, DEFAULT_ETHERTYPE, LinkHeader, MAX_FRAME_LEN, MAX_PAYLOAD_LEN, MacAddr,
    ProtocolHeader, SIGNATURE, parse_ethertype,
};
pub use host::{Clock, KeyInjector, Link, ManualClock, MonotonicClock, NullInjector};
pub use message::MessageType;
pub use packet::{Frame, FrameView, FrameWriter};
pub use protocol::{Keystroke, ScreenChunk, ScreenChunkHeader, ScreenMirror, StatusResponse};
pub use session::{Session, SessionTable, StartOutcome};
