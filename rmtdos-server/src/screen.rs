//! The display served by the server, shared between the engine and
//! whoever paints it.

use std::sync::Arc;

use parking_lot::RwLock;

use rmtdos_core::display::DisplayState;
use rmtdos_core::{KeyInjector, Keystroke, RmtError, TextDisplay, TextScreen};

/// A [`TextScreen`] behind a lock.
///
/// As a [`KeyInjector`] it behaves like a console with local echo:
/// printable keys are typed at the cursor, Enter starts a new line and
/// Backspace erases. Keys with no ASCII value are ignored.
#[derive(Debug, Clone)]
pub struct SharedScreen {
    inner: Arc<RwLock<TextScreen>>,
}

impl SharedScreen {
    pub fn new(screen: TextScreen) -> Self {
        Self {
            inner: Arc::new(RwLock::new(screen)),
        }
    }

    /// Run `f` with the screen locked for writing.
    pub fn update<R>(&self, f: impl FnOnce(&mut TextScreen) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn row_text(&self, row: u8) -> String {
        self.inner.read().row_text(row)
    }
}

impl TextDisplay for SharedScreen {
    fn state(&self) -> DisplayState {
        self.inner.read().state()
    }

    fn read_cells(&self, offset: usize, dest: &mut [u8]) {
        self.inner.read().read_cells(offset, dest);
    }

    fn checksum(&self, offset: usize, count: usize) -> u32 {
        self.inner.read().checksum(offset, count)
    }
}

impl KeyInjector for SharedScreen {
    fn inject(&mut self, key: Keystroke) -> Result<(), RmtError> {
        let mut screen = self.inner.write();
        match key.ascii {
            b'\r' | b'\n' => screen.put_char(b'\n'),
            0x08 => screen.put_char(0x08),
            0x20..=0x7e => screen.put_char(key.ascii),
            _ => {}
        }
        Ok(())
    }
}
