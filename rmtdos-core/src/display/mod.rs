//! The shared text display.
//!
//! The engine only ever reads the display: geometry, cursor, cell bytes
//! and a checksum over a byte range. Whoever owns the display mutates it
//! between ticks. [`TextScreen`] is an in-memory implementation laid out
//! like the VGA text buffer at B800:0000.

use crate::error::RmtError;

/// Bytes per cell: character, then attribute.
pub const CELL_WIDTH: usize = 2;

/// Light grey on black.
pub const DEFAULT_ATTRIBUTE: u8 = 0x07;

/// BIOS video mode for 80×25 colour text.
pub const TEXT_MODE: u8 = 0x03;

// ── DisplayState ─────────────────────────────────────────────────

/// Snapshot of the display's mode, geometry and cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayState {
    pub mode: u8,
    pub page: u8,
    pub rows: u8,
    pub cols: u8,
    pub cursor_row: u8,
    pub cursor_col: u8,
}

impl DisplayState {
    /// Bytes in one row of cells.
    pub fn row_len(&self) -> usize {
        self.cols as usize * CELL_WIDTH
    }

    /// Bytes in the whole visible region.
    pub fn region_len(&self) -> usize {
        self.rows as usize * self.row_len()
    }
}

// ── TextDisplay ──────────────────────────────────────────────────

/// Read-only access to a text display.
pub trait TextDisplay {
    fn state(&self) -> DisplayState;

    /// Fill `dest` with the cell bytes starting at byte `offset`. Bytes
    /// beyond the display read as zero.
    fn read_cells(&self, offset: usize, dest: &mut [u8]);

    /// Checksum `count` cell bytes starting at byte `offset`.
    fn checksum(&self, offset: usize, count: usize) -> u32;
}

/// Checksum used for change detection: the first four bytes of the
/// BLAKE3 digest.
pub fn region_checksum(bytes: &[u8]) -> u32 {
    let digest = blake3::hash(bytes);
    let mut head = [0u8; 4];
    head.copy_from_slice(&digest.as_bytes()[..4]);
    u32::from_le_bytes(head)
}

// ── TextScreen ───────────────────────────────────────────────────

/// An in-memory text display with a teletype-style writer.
#[derive(Debug, Clone)]
pub struct TextScreen {
    mode: u8,
    page: u8,
    rows: u8,
    cols: u8,
    cursor_row: u8,
    cursor_col: u8,
    attribute: u8,
    cells: Vec<u8>,
}

impl TextScreen {
    pub fn new(rows: u8, cols: u8) -> Result<Self, RmtError> {
        check_geometry(rows, cols)?;
        let mut screen = Self {
            mode: TEXT_MODE,
            page: 0,
            rows,
            cols,
            cursor_row: 0,
            cursor_col: 0,
            attribute: DEFAULT_ATTRIBUTE,
            cells: Vec::new(),
        };
        screen.clear();
        Ok(screen)
    }

    pub fn set_mode(&mut self, mode: u8) {
        self.mode = mode;
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Mutable cell bytes, for owners that paint the display directly.
    pub fn cells_mut(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    /// Blank every cell and home the cursor.
    pub fn clear(&mut self) {
        let len = self.rows as usize * self.cols as usize * CELL_WIDTH;
        self.cells.clear();
        self.cells.reserve(len);
        for _ in 0..self.rows as usize * self.cols as usize {
            self.cells.push(b' ');
            self.cells.push(self.attribute);
        }
        self.cursor_row = 0;
        self.cursor_col = 0;
    }

    /// Change geometry. Contents are cleared, as a BIOS mode set would.
    pub fn resize(&mut self, rows: u8, cols: u8) -> Result<(), RmtError> {
        check_geometry(rows, cols)?;
        self.rows = rows;
        self.cols = cols;
        self.clear();
        Ok(())
    }

    pub fn set_cursor(&mut self, row: u8, col: u8) {
        self.cursor_row = row.min(self.rows - 1);
        self.cursor_col = col.min(self.cols - 1);
    }

    /// Write one byte at the cursor, interpreting CR, LF and backspace.
    pub fn put_char(&mut self, ch: u8) {
        match ch {
            b'\r' => self.cursor_col = 0,
            b'\n' => {
                self.cursor_col = 0;
                self.line_feed();
            }
            0x08 => {
                if self.cursor_col > 0 {
                    self.cursor_col -= 1;
                    self.store(self.cursor_row, self.cursor_col, b' ');
                }
            }
            _ => {
                self.store(self.cursor_row, self.cursor_col, ch);
                if self.cursor_col + 1 >= self.cols {
                    self.cursor_col = 0;
                    self.line_feed();
                } else {
                    self.cursor_col += 1;
                }
            }
        }
    }

    pub fn write_str(&mut self, text: &str) {
        for b in text.bytes() {
            self.put_char(b);
        }
    }

    /// The character plane of one row.
    pub fn row_text(&self, row: u8) -> String {
        if row >= self.rows {
            return String::new();
        }
        let row_len = self.cols as usize * CELL_WIDTH;
        let start = row as usize * row_len;
        self.cells[start..start + row_len]
            .chunks_exact(CELL_WIDTH)
            .map(|c| c[0] as char)
            .collect()
    }

    fn store(&mut self, row: u8, col: u8, ch: u8) {
        let i = (row as usize * self.cols as usize + col as usize) * CELL_WIDTH;
        self.cells[i] = ch;
        self.cells[i + 1] = self.attribute;
    }

    fn line_feed(&mut self) {
        if self.cursor_row + 1 < self.rows {
            self.cursor_row += 1;
            return;
        }
        // Scroll up one row and blank the last.
        let row_len = self.cols as usize * CELL_WIDTH;
        self.cells.copy_within(row_len.., 0);
        let last = self.cells.len() - row_len;
        for cell in self.cells[last..].chunks_exact_mut(CELL_WIDTH) {
            cell[0] = b' ';
            cell[1] = self.attribute;
        }
    }
}

/// Chunk offsets are 16-bit, so the whole region must be addressable.
fn check_geometry(rows: u8, cols: u8) -> Result<(), RmtError> {
    let len = rows as usize * cols as usize * CELL_WIDTH;
    if len == 0 || len > u16::MAX as usize {
        return Err(RmtError::InvalidConfig(format!(
            "display geometry {rows}x{cols} is not usable"
        )));
    }
    Ok(())
}

impl TextDisplay for TextScreen {
    fn state(&self) -> DisplayState {
        DisplayState {
            mode: self.mode,
            page: self.page,
            rows: self.rows,
            cols: self.cols,
            cursor_row: self.cursor_row,
            cursor_col: self.cursor_col,
        }
    }

    fn read_cells(&self, offset: usize, dest: &mut [u8]) {
        let start = offset.min(self.cells.len());
        let end = (offset + dest.len()).min(self.cells.len());
        let n = end - start;
        dest[..n].copy_from_slice(&self.cells[start..end]);
        dest[n..].fill(0);
    }

    fn checksum(&self, offset: usize, count: usize) -> u32 {
        let start = offset.min(self.cells.len());
        let end = (offset + count).min(self.cells.len());
        region_checksum(&self.cells[start..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_screen_is_blank() {
        let screen = TextScreen::new(25, 80).unwrap();
        let state = screen.state();
        assert_eq!(state.region_len(), 4000);
        assert_eq!(state.mode, TEXT_MODE);
        assert!(screen.cells().chunks(2).all(|c| c == [b' ', DEFAULT_ATTRIBUTE]));
    }

    #[test]
    fn empty_geometry_rejected() {
        assert!(TextScreen::new(0, 80).is_err());
        assert!(TextScreen::new(25, 80).unwrap().resize(25, 0).is_err());
        assert!(TextScreen::new(255, 255).is_err());
    }

    #[test]
    fn write_wraps_and_tracks_cursor() {
        let mut screen = TextScreen::new(3, 4).unwrap();
        screen.write_str("abcdef");
        assert_eq!(screen.row_text(0), "abcd");
        assert_eq!(screen.row_text(1), "ef  ");
        assert_eq!((screen.state().cursor_row, screen.state().cursor_col), (1, 2));
    }

    #[test]
    fn line_feed_on_last_row_scrolls() {
        let mut screen = TextScreen::new(2, 4).unwrap();
        screen.write_str("one\ntwo\nsix");
        assert_eq!(screen.row_text(0), "two ");
        assert_eq!(screen.row_text(1), "six ");
    }

    #[test]
    fn backspace_erases() {
        let mut screen = TextScreen::new(1, 5).unwrap();
        screen.write_str("ab\x08");
        assert_eq!(screen.row_text(0), "a    ");
        assert_eq!(screen.state().cursor_col, 1);
    }

    #[test]
    fn checksum_tracks_content() {
        let mut screen = TextScreen::new(2, 2).unwrap();
        let before = screen.checksum(0, 8);
        assert_eq!(before, screen.checksum(0, 8));
        screen.put_char(b'x');
        assert_ne!(before, screen.checksum(0, 8));
    }

    #[test]
    fn read_past_end_zero_fills() {
        let screen = TextScreen::new(1, 1).unwrap();
        let mut dest = [0xaa; 4];
        screen.read_cells(0, &mut dest);
        assert_eq!(dest, [b' ', DEFAULT_ATTRIBUTE, 0, 0]);
    }
}
