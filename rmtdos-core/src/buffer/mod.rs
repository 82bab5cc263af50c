//! Receive buffers handed from the link producer to the dispatcher.

mod pool;

pub use pool::{
    BufferPool, BufferState, DEFAULT_BUFFERS, MAX_BUFFERS, PendingBuffer, PoolCensus, ReadyBuffer,
};
