//! Pooled buffers and shared precomputed buffers
//!
//! [`BufferPool`] hands out capacity-bounded [`PooledBuffer`]s that go back to
//! the pool when dropped. A precomputed extended info block is frozen into a
//! [`PrecomputedBuffer`] that knows up front how many observers will read it.
//! Each reader holds a [`BufferLease`]; dropping the lease is the only way to
//! release a reader, so an encode task that errors or panics still releases
//! every buffer it leased. The last lease returns the memory to the pool.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use tracing::{trace, warn};

use crate::error::BufferError;

/// Default number of buffers a pool may have outstanding
pub const DEFAULT_POOL_BUFFERS: usize = 16384;

/// Default initial capacity of each pooled buffer
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Thread-safe pool of reusable byte buffers
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    max_outstanding: usize,
    buffer_capacity: usize,
    outstanding: AtomicUsize,
    acquired_total: AtomicUsize,
    returned_total: AtomicUsize,
}

impl BufferPool {
    pub fn new(max_outstanding: usize, buffer_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            max_outstanding,
            buffer_capacity,
            outstanding: AtomicUsize::new(0),
            acquired_total: AtomicUsize::new(0),
            returned_total: AtomicUsize::new(0),
        })
    }

    /// Take a cleared buffer from the pool
    pub fn acquire(self: &Arc<Self>) -> Result<PooledBuffer, BufferError> {
        let claimed = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_outstanding).then_some(n + 1)
            });
        if claimed.is_err() {
            return Err(BufferError::PoolExhausted {
                capacity: self.max_outstanding,
            });
        }

        let data = self
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity));
        self.acquired_total.fetch_add(1, Ordering::Relaxed);

        Ok(PooledBuffer {
            data: Some(data),
            pool: Arc::clone(self),
        })
    }

    fn give_back(&self, mut data: BytesMut) {
        data.clear();
        self.free.lock().push(data);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.returned_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Buffers currently out of the pool
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    /// Total acquisitions since creation
    pub fn acquired_total(&self) -> usize {
        self.acquired_total.load(Ordering::Relaxed)
    }

    /// Total returns since creation
    pub fn returned_total(&self) -> usize {
        self.returned_total.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("outstanding", &self.outstanding())
            .field("max_outstanding", &self.max_outstanding)
            .finish()
    }
}

/// A buffer borrowed from a [`BufferPool`]; returns itself on drop
pub struct PooledBuffer {
    data: Option<BytesMut>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Swap the contents out for writing; pair with [`PooledBuffer::restore`]
    pub fn take_inner(&mut self) -> BytesMut {
        self.data.take().unwrap_or_default()
    }

    pub fn restore(&mut self, data: BytesMut) {
        self.data = Some(data);
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let data = self.data.take().unwrap_or_default();
        self.pool.give_back(data);
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.bytes().len())
            .finish()
    }
}

struct SharedInner {
    data: RwLock<Option<PooledBuffer>>,
    readers: usize,
    issued: AtomicUsize,
    remaining: AtomicUsize,
    released: AtomicBool,
}

impl SharedInner {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the pooled buffer hands it back to the pool
        self.data.write().take();
    }
}

/// An encoded block shared read-only by a known number of observers
#[derive(Clone)]
pub struct PrecomputedBuffer {
    inner: Arc<SharedInner>,
}

impl PrecomputedBuffer {
    /// Freeze `buffer` for `readers` observers. Zero readers releases at once.
    pub fn new(buffer: PooledBuffer, readers: usize) -> Self {
        let inner = Arc::new(SharedInner {
            data: RwLock::new(Some(buffer)),
            readers,
            issued: AtomicUsize::new(0),
            remaining: AtomicUsize::new(readers),
            released: AtomicBool::new(false),
        });
        if readers == 0 {
            inner.release();
        }
        Self { inner }
    }

    /// Hand out one reader's lease. Fails once every expected reader has one.
    pub fn lease(&self) -> Result<BufferLease, BufferError> {
        let issued = self.inner.issued.fetch_add(1, Ordering::AcqRel);
        if issued >= self.inner.readers {
            self.inner.issued.fetch_sub(1, Ordering::AcqRel);
            return Err(BufferError::LeaseOverflow {
                readers: self.inner.readers,
            });
        }
        Ok(BufferLease {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Expected readers fixed at creation
    pub fn readers(&self) -> usize {
        self.inner.readers
    }

    /// Readers that have not released yet
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Release a buffer whose readers never showed up. Returns the number of
    /// readers that were still outstanding, zero when the buffer was settled.
    pub fn force_release(&self) -> usize {
        let outstanding = self.inner.remaining.swap(0, Ordering::AcqRel);
        if outstanding > 0 {
            warn!(
                outstanding = outstanding,
                readers = self.inner.readers,
                "Force-releasing leaked precomputed buffer"
            );
        }
        self.inner.release();
        outstanding
    }
}

impl fmt::Debug for PrecomputedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrecomputedBuffer")
            .field("readers", &self.readers())
            .field("remaining", &self.remaining())
            .field("released", &self.is_released())
            .finish()
    }
}

/// One reader's claim on a [`PrecomputedBuffer`]
///
/// Dropping the lease releases the reader exactly once.
pub struct BufferLease {
    inner: Arc<SharedInner>,
}

impl BufferLease {
    /// Borrow the encoded bytes for the duration of the returned guard
    pub fn bytes(&self) -> Result<LeaseBytes<'_>, BufferError> {
        let guard = self.inner.data.read();
        if guard.is_none() {
            return Err(BufferError::AlreadyReleased);
        }
        Ok(LeaseBytes { guard })
    }
}

impl Drop for BufferLease {
    fn drop(&mut self) {
        let previous = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => {
                trace!(readers = self.inner.readers, "Last reader released buffer");
                self.inner.release();
            }
            Ok(_) => {}
            // Already force-released by the tick audit
            Err(_) => {}
        }
    }
}

impl fmt::Debug for BufferLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLease")
            .field("readers", &self.inner.readers)
            .finish()
    }
}

/// Read guard over a leased buffer's bytes
pub struct LeaseBytes<'a> {
    guard: parking_lot::RwLockReadGuard<'a, Option<PooledBuffer>>,
}

impl Deref for LeaseBytes<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard.as_ref().map(PooledBuffer::bytes).unwrap_or(&[])
    }
}
