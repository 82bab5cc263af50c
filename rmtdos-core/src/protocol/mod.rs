//! Typed payloads carried after the protocol header.
//!
//! Each sub-module owns the fixed binary layout of one message body.
//! Layouts are network byte order and never change size, so they are
//! encoded by hand rather than through a serializer.

pub mod keystroke;
pub mod screen;
pub mod status;

pub use keystroke::{KEYSTROKE_LEN, Keystroke, Keystrokes};
pub use screen::{SCREEN_CHUNK_HEADER_LEN, ScreenChunk, ScreenChunkHeader, ScreenMirror};
pub use status::{STATUS_RESPONSE_LEN, StatusResponse};
