//! Networking module
//!
//! Wire-level building blocks shared by the encoders:
//! - Byte buffers with the RS value transforms
//! - Bit-packed readers and writers
//! - Pooled and shared precomputed buffers

pub mod bits;
pub mod buffer;
pub mod pool;

pub use bits::{BitReader, BitWriter};
pub use buffer::PacketBuffer;
pub use pool::{BufferLease, BufferPool, PooledBuffer, PrecomputedBuffer};
