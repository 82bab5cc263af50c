//! Text screen mirroring.
//!
//! ```text
//! Peer   ──[SessionStart]──► Server   (every few seconds)
//!   Payload: empty
//!
//! Server ──[ScreenChunk]───► Peer     (every tick while the screen changes)
//!   Payload: ScreenChunkHeader (8 bytes) + `count` raw cell bytes
//! ```
//!
//! A chunk covers whole rows starting at byte `offset` of the display.
//! Cells are two bytes, character then attribute, exactly as the display
//! stores them.

use std::ops::Range;

use crate::display::CELL_WIDTH;
use crate::error::RmtError;

/// Encoded size of [`ScreenChunkHeader`].
pub const SCREEN_CHUNK_HEADER_LEN: usize = 8;

// ── ScreenChunkHeader ────────────────────────────────────────────

/// Geometry and placement of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenChunkHeader {
    /// Current height of the screen.
    pub rows: u8,
    /// Current width of the screen.
    pub cols: u8,
    pub cursor_row: u8,
    pub cursor_col: u8,
    /// Byte offset of the first cell from the start of the display.
    pub offset: u16,
    /// Count of cell bytes that follow the header.
    pub count: u16,
}

impl ScreenChunkHeader {
    /// Write into the first [`SCREEN_CHUNK_HEADER_LEN`] bytes of `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`SCREEN_CHUNK_HEADER_LEN`].
    pub fn encode_into(&self, dst: &mut [u8]) {
        dst[0] = self.rows;
        dst[1] = self.cols;
        dst[2] = self.cursor_row;
        dst[3] = self.cursor_col;
        dst[4..6].copy_from_slice(&self.offset.to_be_bytes());
        dst[6..8].copy_from_slice(&self.count.to_be_bytes());
    }

    pub fn decode(data: &[u8]) -> Result<Self, RmtError> {
        if data.len() < SCREEN_CHUNK_HEADER_LEN {
            return Err(RmtError::FrameTooShort {
                needed: SCREEN_CHUNK_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            rows: data[0],
            cols: data[1],
            cursor_row: data[2],
            cursor_col: data[3],
            offset: u16::from_be_bytes([data[4], data[5]]),
            count: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// Byte range of the display this chunk covers.
    pub fn byte_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.count as usize
    }
}

// ── ScreenChunk ──────────────────────────────────────────────────

/// A parsed ScreenChunk payload borrowing its cell bytes.
#[derive(Debug, Clone, Copy)]
pub struct ScreenChunk<'a> {
    pub header: ScreenChunkHeader,
    pub cells: &'a [u8],
}

impl<'a> ScreenChunk<'a> {
    /// Parse a payload. Cell bytes are clamped to what was received.
    pub fn parse(payload: &'a [u8]) -> Result<Self, RmtError> {
        let header = ScreenChunkHeader::decode(payload)?;
        let body = &payload[SCREEN_CHUNK_HEADER_LEN..];
        let len = (header.count as usize).min(body.len());
        Ok(Self {
            header,
            cells: &body[..len],
        })
    }
}

// ── ScreenMirror ─────────────────────────────────────────────────

/// Client-side copy of a server's display, rebuilt from chunks.
#[derive(Debug, Clone, Default)]
pub struct ScreenMirror {
    rows: u8,
    cols: u8,
    cursor: (u8, u8),
    cells: Vec<u8>,
}

impl ScreenMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    /// `(row, col)` of the remote cursor as of the last chunk.
    pub fn cursor(&self) -> (u8, u8) {
        self.cursor
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Copy a chunk into place; returns the byte range that was written.
    ///
    /// A geometry change clears the mirror before applying.
    pub fn apply(&mut self, chunk: &ScreenChunk<'_>) -> Result<Range<usize>, RmtError> {
        let hdr = chunk.header;
        if hdr.rows != self.rows || hdr.cols != self.cols {
            self.rows = hdr.rows;
            self.cols = hdr.cols;
            self.cells.clear();
            self.cells
                .resize(hdr.rows as usize * hdr.cols as usize * CELL_WIDTH, 0);
        }
        self.cursor = (hdr.cursor_row, hdr.cursor_col);

        let start = hdr.offset as usize;
        let end = start + chunk.cells.len();
        if end > self.cells.len() {
            return Err(RmtError::PayloadTooLarge {
                size: end,
                max: self.cells.len(),
            });
        }
        self.cells[start..end].copy_from_slice(chunk.cells);
        Ok(start..end)
    }

    /// `(character, attribute)` at a position, if inside the screen.
    pub fn cell(&self, row: u8, col: u8) -> Option<(u8, u8)> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let i = (row as usize * self.cols as usize + col as usize) * CELL_WIDTH;
        Some((self.cells[i], self.cells[i + 1]))
    }

    /// The character plane as text, one string per row. Bytes outside
    /// printable ASCII render as spaces.
    pub fn text_lines(&self) -> impl Iterator<Item = String> + '_ {
        let row_bytes = (self.cols as usize * CELL_WIDTH).max(1);
        self.cells.chunks(row_bytes).map(|row| {
            row.chunks_exact(CELL_WIDTH)
                .map(|cell| match cell[0] {
                    b @ 0x20..=0x7e => b as char,
                    _ => ' ',
                })
                .collect()
        })
    }
}
