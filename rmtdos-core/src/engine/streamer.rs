//! Periodic screen streaming.
//!
//! Each tick sends at most one ScreenChunk, fanned out to every session.
//! A full pass over the screen takes `ceil(rows / rows_per_chunk)` ticks.
//! A pass only starts when the screen's checksum differs from the one
//! taken at the start of the previous pass.

use tracing::{trace, warn};

use super::Engine;
use crate::display::{CELL_WIDTH, TextDisplay};
use crate::error::RmtError;
use crate::header::{LinkHeader, MacAddr};
use crate::host::{Clock, KeyInjector, Link};
use crate::message::MessageType;
use crate::packet::FrameWriter;
use crate::protocol::{SCREEN_CHUNK_HEADER_LEN, ScreenChunkHeader};

/// What one call to [`Engine::streamer_tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No live sessions.
    Idle,
    /// A pass was due but the screen had not changed.
    Unchanged,
    /// The display region is too large for 16-bit chunk offsets, so
    /// nothing can be streamed.
    Oversized { region_len: usize },
    /// A chunk was built and offered to every session.
    Sent {
        first_row: usize,
        rows: usize,
        delivered: usize,
    },
}

impl<L, D, K, C> Engine<L, D, K, C>
where
    L: Link,
    D: TextDisplay,
    K: KeyInjector,
    C: Clock,
{
    /// Reap stale sessions, then send the next slice of the screen.
    ///
    /// Transmit failures do not stop the fan-out; the first one is
    /// returned once every session has been tried.
    pub fn streamer_tick(&mut self) -> Result<TickOutcome, RmtError> {
        let now = self.clock.now();
        self.sessions.reap(now, self.config.session_lifetime);
        if self.sessions.active_count() == 0 {
            self.scan_row = 0;
            return Ok(TickOutcome::Idle);
        }

        let state = self.display.state();
        let rows = state.rows as usize;
        let cols = state.cols as usize;
        if rows == 0 || cols == 0 {
            self.scan_row = 0;
            return Ok(TickOutcome::Unchanged);
        }
        let region_len = state.region_len();
        if region_len > u16::MAX as usize {
            self.scan_row = 0;
            trace!(rows, cols, region_len, "display too large to stream");
            return Ok(TickOutcome::Oversized { region_len });
        }
        if self.scan_row >= rows {
            self.scan_row = 0;
        }

        if self.scan_row == 0 {
            let checksum = self.display.checksum(0, region_len);
            if self.last_checksum == Some(checksum) {
                self.stats.unchanged_skips += 1;
                return Ok(TickOutcome::Unchanged);
            }
            self.last_checksum = Some(checksum);
        }

        let row_len = cols * CELL_WIDTH;
        let first_row = self.scan_row;
        let chunk_rows = self.config.rows_per_chunk(cols).min(rows - first_row);
        let offset = first_row * row_len;
        let count = chunk_rows * row_len;

        let mut writer = FrameWriter::new(&mut self.send_buf)?;
        let link = LinkHeader {
            destination: MacAddr::ZERO,
            source: self.identity,
            ethertype: self.config.ethertype,
        };
        writer.write_headers(&link, 0);
        let payload = writer.payload_mut();
        ScreenChunkHeader {
            rows: state.rows,
            cols: state.cols,
            cursor_row: state.cursor_row,
            cursor_col: state.cursor_col,
            offset: offset as u16,
            count: count as u16,
        }
        .encode_into(payload);
        self.display
            .read_cells(offset, &mut payload[SCREEN_CHUNK_HEADER_LEN..SCREEN_CHUNK_HEADER_LEN + count]);
        let len = writer.finish(MessageType::ScreenChunk, SCREEN_CHUNK_HEADER_LEN + count)?;

        self.scan_row = first_row + chunk_rows;
        if self.scan_row >= rows {
            self.scan_row = 0;
        }

        let mut delivered = 0;
        let mut first_error = None;
        for session in self.sessions.iter() {
            writer.retarget(session.identity, session.nonce);
            match self.link.transmit(&writer.as_bytes()[..len]) {
                Ok(()) => {
                    delivered += 1;
                    self.stats.chunks_sent += 1;
                }
                Err(e) => {
                    self.stats.transmit_errors += 1;
                    warn!(identity = %session.identity, "screen chunk not sent: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        trace!(first_row, rows = chunk_rows, delivered, "screen chunk");

        match first_error {
            Some(e) => Err(e),
            None => Ok(TickOutcome::Sent {
                first_row,
                rows: chunk_rows,
                delivered,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::BufferPool;
    use crate::display::{DisplayState, TextScreen};
    use crate::engine::EngineConfig;
    use crate::engine::testing::{RecordingLink, SERVER};
    use crate::host::{ManualClock, NullInjector};
    use crate::packet::FrameView;
    use crate::protocol::ScreenChunk;

    const PEER_A: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0xa0]);
    const PEER_B: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0xb0]);

    type TestEngine = Engine<RecordingLink, TextScreen, NullInjector, ManualClock>;

    fn engine(rows: u8, cols: u8) -> TestEngine {
        Engine::new(
            EngineConfig::default(),
            Arc::new(BufferPool::new(2).unwrap()),
            RecordingLink::default(),
            TextScreen::new(rows, cols).unwrap(),
            NullInjector,
            ManualClock::new(0),
        )
        .unwrap()
    }

    fn attach(engine: &mut TestEngine, peer: MacAddr, nonce: u32) {
        let now = engine.clock.now();
        engine.sessions.start_or_refresh(peer, nonce, now).unwrap();
        engine.last_checksum = None;
    }

    #[test]
    fn idle_without_sessions() {
        let mut engine = engine(25, 80);
        assert_eq!(engine.streamer_tick().unwrap(), TickOutcome::Idle);
        assert!(engine.link().sent.is_empty());
        assert_eq!(engine.last_checksum(), None);
    }

    #[test]
    fn chunk_is_fanned_out_to_every_session() {
        let mut engine = engine(4, 10);
        engine.display_mut().write_str("hi");
        attach(&mut engine, PEER_A, 1);
        attach(&mut engine, PEER_B, 2);

        let outcome = engine.streamer_tick().unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Sent {
                first_row: 0,
                rows: 4,
                delivered: 2
            }
        );

        let sent = &engine.link().sent;
        let a = FrameView::parse(&sent[0]).unwrap();
        let b = FrameView::parse(&sent[1]).unwrap();
        assert_eq!((a.link.destination, a.nonce()), (PEER_A, 1));
        assert_eq!((b.link.destination, b.nonce()), (PEER_B, 2));
        assert_eq!(a.link.source, SERVER);
        assert_eq!(a.payload(), b.payload());

        let chunk = ScreenChunk::parse(a.payload()).unwrap();
        assert_eq!(chunk.header.offset, 0);
        assert_eq!(chunk.header.count, 80);
        assert_eq!(&chunk.cells[..4], b"h\x07i\x07");
        assert_eq!((chunk.header.cursor_row, chunk.header.cursor_col), (0, 2));
    }

    #[test]
    fn unchanged_screen_is_not_resent() {
        let mut engine = engine(4, 10);
        attach(&mut engine, PEER_A, 1);
        assert!(matches!(engine.streamer_tick().unwrap(), TickOutcome::Sent { .. }));
        assert_eq!(engine.streamer_tick().unwrap(), TickOutcome::Unchanged);
        assert_eq!(engine.link().sent.len(), 1);

        engine.display_mut().put_char(b'!');
        assert!(matches!(engine.streamer_tick().unwrap(), TickOutcome::Sent { .. }));
        assert_eq!(engine.stats().unchanged_skips, 1);
    }

    #[test]
    fn new_session_forces_a_full_pass() {
        let mut engine = engine(4, 10);
        attach(&mut engine, PEER_A, 1);
        engine.streamer_tick().unwrap();
        assert_eq!(engine.streamer_tick().unwrap(), TickOutcome::Unchanged);

        attach(&mut engine, PEER_B, 2);
        assert!(matches!(
            engine.streamer_tick().unwrap(),
            TickOutcome::Sent { delivered: 2, .. }
        ));
    }

    #[test]
    fn shrinking_display_resets_cursor() {
        let mut engine = engine(25, 80);
        attach(&mut engine, PEER_A, 1);
        engine.streamer_tick().unwrap();
        engine.streamer_tick().unwrap();
        assert_eq!(engine.scan_row(), 18);

        engine.display_mut().resize(10, 80).unwrap();
        let outcome = engine.streamer_tick().unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Sent {
                first_row: 0,
                rows: 9,
                delivered: 1
            }
        );
        assert_eq!(engine.scan_row(), 9);
    }

    #[test]
    fn expired_sessions_get_nothing() {
        let mut engine = engine(4, 10);
        attach(&mut engine, PEER_A, 1);
        engine.clock().set(10_001);
        assert_eq!(engine.streamer_tick().unwrap(), TickOutcome::Idle);
        assert!(engine.link().sent.is_empty());
        assert!(engine.sessions().is_empty());
    }

    #[test]
    fn transmit_failure_still_advances() {
        let mut engine = engine(25, 80);
        attach(&mut engine, PEER_A, 1);
        engine.link_mut().fail = true;
        assert!(engine.streamer_tick().is_err());
        assert_eq!(engine.scan_row(), 9);
        assert_eq!(engine.stats().transmit_errors, 1);
    }

    /// A display reporting a geometry no 16-bit offset can address.
    struct WideDisplay;

    impl TextDisplay for WideDisplay {
        fn state(&self) -> DisplayState {
            DisplayState {
                mode: 3,
                page: 0,
                rows: 255,
                cols: 255,
                cursor_row: 0,
                cursor_col: 0,
            }
        }

        fn read_cells(&self, _offset: usize, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn checksum(&self, _offset: usize, _count: usize) -> u32 {
            0
        }
    }

    #[test]
    fn oversized_display_is_not_streamed() {
        let mut engine = Engine::new(
            EngineConfig::default(),
            Arc::new(BufferPool::new(2).unwrap()),
            RecordingLink::default(),
            WideDisplay,
            NullInjector,
            ManualClock::new(0),
        )
        .unwrap();
        engine.sessions.start_or_refresh(PEER_A, 1, 0).unwrap();

        let outcome = engine.streamer_tick().unwrap();
        assert_eq!(outcome, TickOutcome::Oversized { region_len: 255 * 255 * 2 });
        assert!(engine.link().sent.is_empty());
        assert_eq!(engine.scan_row(), 0);
        assert_eq!(engine.last_checksum(), None);
    }
}
