//! Interfaces to the world outside the engine: the link that carries
//! frames, the host keyboard queue, and the tick counter.
//!
//! The display side lives in [`crate::display`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::RmtError;
use crate::header::MacAddr;
use crate::protocol::Keystroke;

// ── Link ─────────────────────────────────────────────────────────

/// Transmit half of the link layer.
///
/// The receive half is not a trait: whatever owns the link feeds frames
/// into [`BufferPool::receive_into`](crate::buffer::BufferPool::receive_into).
pub trait Link {
    /// Hand one complete frame to the link. Failures are reported and
    /// never retried by the engine.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), RmtError>;

    /// This station's link identity.
    fn identity(&self) -> MacAddr;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), RmtError> {
        (**self).transmit(frame)
    }

    fn identity(&self) -> MacAddr {
        (**self).identity()
    }
}

// ── KeyInjector ──────────────────────────────────────────────────

/// Forwards remote keystrokes into the host input queue.
pub trait KeyInjector {
    fn inject(&mut self, key: Keystroke) -> Result<(), RmtError>;
}

/// Discards every keystroke.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInjector;

impl KeyInjector for NullInjector {
    fn inject(&mut self, _key: Keystroke) -> Result<(), RmtError> {
        Ok(())
    }
}

// ── Clock ────────────────────────────────────────────────────────

/// Monotonic tick counter used for session lifetimes.
pub trait Clock {
    fn now(&self) -> u64;
}

/// Milliseconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, by: u64) {
        self.now.fetch_add(by, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> u64 {
        (**self).now()
    }
}
