//! Fixed pool of receive buffers shared by the link producer and the
//! mainline dispatcher.
//!
//! ```text
//!            acquire                mark_ready
//!   Free ─────────────► Pending ─────────────► Ready
//!    ▲      (producer)            (producer)     │
//!    │                                           │ take_ready
//!    └────────────────── InUse ◄─────────────────┘ (consumer)
//!          release
//!         (consumer)
//! ```
//!
//! Slots are linked into a free list and a ready list through their
//! `next` index. Both heads live behind one mutex that is held only while
//! a head is swapped; filling and reading buffer contents happen outside
//! it, through a handle that owns the slot's storage while it is out of
//! the pool. The ready list is LIFO.
//!
//! Nothing here allocates after [`BufferPool::new`]: storage moves between
//! slot and handle as a boxed slice.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::RmtError;
use crate::header::MAX_FRAME_LEN;

/// Upper bound on pool size accepted from configuration.
pub const MAX_BUFFERS: usize = 10;

/// Pool size when nothing else is configured.
pub const DEFAULT_BUFFERS: usize = 2;

// ── BufferState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// On the free list, available to the producer.
    Free,
    /// Held by the producer while it copies a frame in.
    Pending,
    /// On the ready list, waiting for the consumer.
    Ready,
    /// Held by the consumer.
    InUse,
}

/// Count of slots in each state at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCensus {
    pub free: usize,
    pub pending: usize,
    pub ready: usize,
    pub in_use: usize,
}

impl PoolCensus {
    pub fn total(&self) -> usize {
        self.free + self.pending + self.ready + self.in_use
    }
}

// ── Internal lists ───────────────────────────────────────────────

struct Slot {
    state: BufferState,
    len: usize,
    next: Option<usize>,
    /// Empty while a handle holds the storage.
    storage: Box<[u8]>,
}

struct Lists {
    slots: Box<[Slot]>,
    free: Option<usize>,
    ready: Option<usize>,
}

impl Lists {
    fn pop(&mut self, head: ListHead, state: BufferState) -> Option<(usize, usize, Box<[u8]>)> {
        let index = match head {
            ListHead::Free => self.free?,
            ListHead::Ready => self.ready?,
        };
        let slot = &mut self.slots[index];
        let next = slot.next.take();
        slot.state = state;
        let popped = (index, slot.len, mem::take(&mut slot.storage));
        match head {
            ListHead::Free => self.free = next,
            ListHead::Ready => self.ready = next,
        }
        Some(popped)
    }

    fn push(&mut self, head: ListHead, index: usize, len: usize, storage: Box<[u8]>) {
        let top = match head {
            ListHead::Free => self.free.replace(index),
            ListHead::Ready => self.ready.replace(index),
        };
        let slot = &mut self.slots[index];
        slot.state = match head {
            ListHead::Free => BufferState::Free,
            ListHead::Ready => BufferState::Ready,
        };
        slot.len = len;
        slot.next = top;
        slot.storage = storage;
    }
}

#[derive(Clone, Copy)]
enum ListHead {
    Free,
    Ready,
}

// ── BufferPool ───────────────────────────────────────────────────

pub struct BufferPool {
    lists: Mutex<Lists>,
    capacity: usize,
    slot_capacity: usize,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl BufferPool {
    /// Allocate `count` slots of [`MAX_FRAME_LEN`] bytes each.
    pub fn new(count: usize) -> Result<Self, RmtError> {
        Self::with_slot_capacity(count, MAX_FRAME_LEN)
    }

    pub fn with_slot_capacity(count: usize, slot_capacity: usize) -> Result<Self, RmtError> {
        if count == 0 || slot_capacity == 0 {
            return Err(RmtError::InvalidConfig(format!(
                "buffer pool of {count} x {slot_capacity} bytes"
            )));
        }

        let slots: Box<[Slot]> = (0..count)
            .map(|i| Slot {
                state: BufferState::Free,
                len: 0,
                next: (i + 1 < count).then_some(i + 1),
                storage: vec![0u8; slot_capacity].into_boxed_slice(),
            })
            .collect();

        Ok(Self {
            lists: Mutex::new(Lists {
                slots,
                free: Some(0),
                ready: None,
            }),
            capacity: count,
            slot_capacity,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// Frames handed a buffer since startup.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Frames refused for lack of a buffer (or for being oversized).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    // ── Producer side ────────────────────────────────────────────

    /// Take a free buffer for a frame of `size` bytes.
    ///
    /// Never blocks beyond the head swap and never allocates. Fails with
    /// [`RmtError::PoolExhausted`] when the free list is empty and with
    /// [`RmtError::FrameTooLarge`] when `size` exceeds a slot; both count
    /// as a dropped frame.
    pub fn acquire(&self, size: usize) -> Result<PendingBuffer<'_>, RmtError> {
        if size > self.slot_capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(RmtError::FrameTooLarge {
                size,
                max: self.slot_capacity,
            });
        }

        let popped = self.lists.lock().pop(ListHead::Free, BufferState::Pending);
        match popped {
            Some((index, _, storage)) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(PendingBuffer {
                    pool: self,
                    index,
                    len: size,
                    storage,
                })
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("buffer pool exhausted");
                Err(RmtError::PoolExhausted)
            }
        }
    }

    /// Publish a filled buffer to the consumer.
    pub fn mark_ready(&self, buffer: PendingBuffer<'_>) {
        buffer.mark_ready();
    }

    /// Copy a received frame into a pool buffer and publish it.
    pub fn receive_into(&self, frame: &[u8]) -> Result<(), RmtError> {
        let mut buffer = self.acquire(frame.len())?;
        buffer.as_mut_slice().copy_from_slice(frame);
        buffer.mark_ready();
        Ok(())
    }

    // ── Consumer side ────────────────────────────────────────────

    /// Detach the most recently readied buffer, if any.
    pub fn take_ready(&self) -> Option<ReadyBuffer<'_>> {
        let (index, len, storage) = self.lists.lock().pop(ListHead::Ready, BufferState::InUse)?;
        Some(ReadyBuffer {
            pool: self,
            index,
            len,
            storage,
        })
    }

    /// Zero a consumed buffer and return it to the free list.
    pub fn release(&self, buffer: ReadyBuffer<'_>) {
        buffer.release();
    }

    /// Count slots per state.
    pub fn census(&self) -> PoolCensus {
        let lists = self.lists.lock();
        let mut census = PoolCensus::default();
        for slot in lists.slots.iter() {
            match slot.state {
                BufferState::Free => census.free += 1,
                BufferState::Pending => census.pending += 1,
                BufferState::Ready => census.ready += 1,
                BufferState::InUse => census.in_use += 1,
            }
        }
        census
    }

    /// State of one slot.
    pub fn state_of(&self, index: usize) -> Option<BufferState> {
        self.lists.lock().slots.get(index).map(|s| s.state)
    }

    fn push(&self, head: ListHead, index: usize, len: usize, storage: Box<[u8]>) {
        self.lists.lock().push(head, index, len, storage);
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("slot_capacity", &self.slot_capacity)
            .field("census", &self.census())
            .field("dropped", &self.dropped())
            .finish()
    }
}

// ── Handles ──────────────────────────────────────────────────────

/// A buffer held by the producer. Dropping it without
/// [`mark_ready`](Self::mark_ready) returns it to the free list.
pub struct PendingBuffer<'a> {
    pool: &'a BufferPool,
    index: usize,
    len: usize,
    storage: Box<[u8]>,
}

impl PendingBuffer<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `size` bytes requested at acquire time.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }

    /// Shrink the recorded length after a short copy.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn mark_ready(mut self) {
        let storage = mem::take(&mut self.storage);
        self.pool.push(ListHead::Ready, self.index, self.len, storage);
    }
}

impl Drop for PendingBuffer<'_> {
    fn drop(&mut self) {
        if !self.storage.is_empty() {
            let mut storage = mem::take(&mut self.storage);
            storage.fill(0);
            self.pool.push(ListHead::Free, self.index, 0, storage);
        }
    }
}

/// A buffer held by the consumer. Dropping it is the same as
/// [`release`](Self::release).
pub struct ReadyBuffer<'a> {
    pool: &'a BufferPool,
    index: usize,
    len: usize,
    storage: Box<[u8]>,
}

impl ReadyBuffer<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    pub fn release(mut self) {
        self.give_back();
    }

    fn give_back(&mut self) {
        let mut storage = mem::take(&mut self.storage);
        storage.fill(0);
        self.pool.push(ListHead::Free, self.index, 0, storage);
    }
}

impl Drop for ReadyBuffer<'_> {
    fn drop(&mut self) {
        if !self.storage.is_empty() {
            self.give_back();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_pool_rejected() {
        assert!(BufferPool::new(0).is_err());
    }

    #[test]
    fn exhaustion_and_recovery() {
        let pool = BufferPool::new(2).unwrap();
        let a = pool.acquire(60).unwrap();
        let b = pool.acquire(60).unwrap();
        assert!(matches!(pool.acquire(60), Err(RmtError::PoolExhausted)));
        assert_eq!(pool.dropped(), 1);

        a.mark_ready();
        let ready = pool.take_ready().unwrap();
        pool.release(ready);

        let c = pool.acquire(60).unwrap();
        assert_eq!(pool.census().pending, 2);
        drop((b, c));
        assert_eq!(pool.census().free, 2);
    }

    #[test]
    fn oversized_request_is_dropped() {
        let pool = BufferPool::new(1).unwrap();
        assert!(matches!(
            pool.acquire(MAX_FRAME_LEN + 1),
            Err(RmtError::FrameTooLarge { .. })
        ));
        assert_eq!(pool.dropped(), 1);
        assert_eq!(pool.census().free, 1);
    }

    #[test]
    fn states_follow_the_cycle() {
        let pool = BufferPool::new(1).unwrap();
        let mut pending = pool.acquire(4).unwrap();
        let index = pending.index();
        assert_eq!(pool.state_of(index), Some(BufferState::Pending));

        pending.as_mut_slice().copy_from_slice(b"abcd");
        pool.mark_ready(pending);
        assert_eq!(pool.state_of(index), Some(BufferState::Ready));

        let ready = pool.take_ready().unwrap();
        assert_eq!(pool.state_of(index), Some(BufferState::InUse));
        assert_eq!(ready.as_slice(), b"abcd");

        ready.release();
        assert_eq!(pool.state_of(index), Some(BufferState::Free));
        assert!(pool.take_ready().is_none());
    }

    #[test]
    fn release_zeroes_contents() {
        let pool = BufferPool::new(1).unwrap();
        pool.receive_into(b"secret").unwrap();
        drop(pool.take_ready().unwrap());

        let mut again = pool.acquire(6).unwrap();
        assert_eq!(again.as_mut_slice(), &[0u8; 6]);
    }

    #[test]
    fn ready_list_is_lifo() {
        let pool = BufferPool::new(3).unwrap();
        pool.receive_into(b"1").unwrap();
        pool.receive_into(b"2").unwrap();
        pool.receive_into(b"3").unwrap();

        let order: Vec<u8> = std::iter::from_fn(|| pool.take_ready().map(|b| b.as_slice()[0]))
            .collect();
        assert_eq!(order, b"321");
    }

    #[test]
    fn abandoned_pending_buffer_returns_to_free() {
        let pool = BufferPool::new(1).unwrap();
        {
            let _pending = pool.acquire(10).unwrap();
            assert_eq!(pool.census().pending, 1);
        }
        assert_eq!(pool.census().free, 1);
        assert!(pool.take_ready().is_none());
    }

    #[test]
    fn truncate_shortens_published_length() {
        let pool = BufferPool::new(1).unwrap();
        let mut pending = pool.acquire(100).unwrap();
        pending.as_mut_slice()[..3].copy_from_slice(b"abc");
        pending.truncate(3);
        pending.mark_ready();
        assert_eq!(pool.take_ready().unwrap().as_slice(), b"abc");
    }

    #[test]
    fn census_always_sums_to_capacity_under_contention() {
        const FRAMES: usize = 5_000;
        let pool = BufferPool::new(3).unwrap();

        std::thread::scope(|s| {
            s.spawn(|| {
                let mut sent = 0usize;
                while sent < FRAMES {
                    let tag = (sent % 251) as u8;
                    match pool.acquire(32) {
                        Ok(mut buf) => {
                            buf.as_mut_slice().fill(tag);
                            buf.mark_ready();
                            sent += 1;
                        }
                        Err(RmtError::PoolExhausted) => std::thread::yield_now(),
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });

            let mut received = 0usize;
            while received < FRAMES {
                assert_eq!(pool.census().total(), pool.capacity());
                if let Some(buf) = pool.take_ready() {
                    let first = buf.as_slice()[0];
                    assert!(buf.as_slice().iter().all(|&b| b == first));
                    buf.release();
                    received += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        assert_eq!(pool.census().free, 3);
        assert_eq!(pool.accepted(), FRAMES as u64);
    }
}
