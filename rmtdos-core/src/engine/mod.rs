//! The server engine.
//!
//! One [`Engine`] owns everything the mainline touches: the session table,
//! the scan cursor, the last-sent checksum and the send buffer. The only
//! state shared with the receive side is the [`BufferPool`], held by `Arc`.
//!
//! ```text
//!  link rx ──► BufferPool ──► process_ready_buffers ──► SessionTable
//!                                     │                      │
//!                                     ▼                      ▼
//!                                 Link::transmit ◄──── streamer_tick ◄── TextDisplay
//! ```
//!
//! The surrounding runtime calls [`Engine::process_ready_buffers`] when
//! frames arrive and [`Engine::streamer_tick`] on a fixed period. Neither
//! blocks or allocates.

mod dispatcher;
mod streamer;

pub use streamer::TickOutcome;

use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::display::{CELL_WIDTH, TextDisplay};
use crate::error::RmtError;
use crate::header::{COMBINED_HEADER_LEN, DEFAULT_ETHERTYPE, MAX_FRAME_LEN, MAX_JUMBO_FRAME_LEN, MacAddr};
use crate::host::{Clock, KeyInjector, Link, MonotonicClock, NullInjector};
use crate::protocol::SCREEN_CHUNK_HEADER_LEN;
use crate::session::{DEFAULT_SESSIONS, SessionTable};

/// Session lifetime in clock ticks (milliseconds for [`MonotonicClock`]).
pub const DEFAULT_SESSION_LIFETIME: u64 = 10_000;

/// Smallest MTU that still fits one row of the widest possible display.
pub const MIN_MTU: usize = COMBINED_HEADER_LEN + SCREEN_CHUNK_HEADER_LEN + u8::MAX as usize * CELL_WIDTH;

// ── EngineConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Link type tag stamped on every transmitted frame and required on
    /// every received one.
    pub ethertype: u16,
    /// Largest frame the engine transmits. Clamped to
    /// `MIN_MTU..=MAX_JUMBO_FRAME_LEN`.
    pub mtu: usize,
    /// Idle time after which a session is reaped.
    pub session_lifetime: u64,
    /// Session table capacity.
    pub sessions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ethertype: DEFAULT_ETHERTYPE,
            mtu: MAX_FRAME_LEN,
            session_lifetime: DEFAULT_SESSION_LIFETIME,
            sessions: DEFAULT_SESSIONS,
        }
    }
}

impl EngineConfig {
    pub fn effective_mtu(&self) -> usize {
        self.mtu.clamp(MIN_MTU, MAX_JUMBO_FRAME_LEN)
    }

    /// Whole rows of `cols` cells that fit one ScreenChunk payload.
    pub fn rows_per_chunk(&self, cols: usize) -> usize {
        let budget = self.effective_mtu() - COMBINED_HEADER_LEN - SCREEN_CHUNK_HEADER_LEN;
        (budget / (cols * CELL_WIDTH).max(1)).max(1)
    }
}

// ── EngineStats ──────────────────────────────────────────────────

/// Running counters. Never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames that parsed and were routed to a handler.
    pub processed: u64,
    /// Frames dropped as malformed, foreign or misaddressed.
    pub rejected: u64,
    /// SessionStart requests refused because the table was full.
    pub sessions_rejected: u64,
    /// Keystrokes forwarded to the injector.
    pub keystrokes: u64,
    /// ScreenChunk frames handed to the link.
    pub chunks_sent: u64,
    /// Ticks skipped because the screen had not changed.
    pub unchanged_skips: u64,
    /// Transmit calls that failed.
    pub transmit_errors: u64,
}

// ── Engine ───────────────────────────────────────────────────────

pub struct Engine<L, D, K = NullInjector, C = MonotonicClock> {
    config: EngineConfig,
    identity: MacAddr,
    pool: Arc<BufferPool>,
    sessions: SessionTable,
    link: L,
    display: D,
    injector: K,
    clock: C,
    scan_row: usize,
    last_checksum: Option<u32>,
    send_buf: Box<[u8]>,
    stats: EngineStats,
}

impl<L, D, K, C> Engine<L, D, K, C>
where
    L: Link,
    D: TextDisplay,
    K: KeyInjector,
    C: Clock,
{
    /// Size the session table and send buffer. This is the only place the
    /// engine allocates.
    ///
    /// The send buffer always holds a full-size frame so replies fit
    /// whatever the pool accepted; the MTU only bounds screen chunks.
    pub fn new(
        config: EngineConfig,
        pool: Arc<BufferPool>,
        link: L,
        display: D,
        injector: K,
        clock: C,
    ) -> Result<Self, RmtError> {
        let sessions = SessionTable::new(config.sessions)?;
        let send_buf = vec![0u8; config.effective_mtu().max(MAX_FRAME_LEN)].into_boxed_slice();
        Ok(Self {
            identity: link.identity(),
            config,
            pool,
            sessions,
            link,
            display,
            injector,
            clock,
            scan_row: 0,
            last_checksum: None,
            send_buf,
            stats: EngineStats::default(),
        })
    }
}

impl<L, D, K, C> Engine<L, D, K, C> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn identity(&self) -> MacAddr {
        self.identity
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Mutable access for owners that paint the display between ticks.
    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn injector(&self) -> &K {
        &self.injector
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Row the next ScreenChunk starts at.
    pub fn scan_row(&self) -> usize {
        self.scan_row
    }

    /// Checksum of the last full pass that was started.
    pub fn last_checksum(&self) -> Option<u32> {
        self.last_checksum
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }
}

impl<L, D, K, C> std::fmt::Debug for Engine<L, D, K, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .field("sessions", &self.sessions.active_count())
            .field("scan_row", &self.scan_row)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
