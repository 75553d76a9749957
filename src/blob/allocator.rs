use std::{fmt, sync::Mutex};

/// Source of chunk buffers for a [`crate::blob::BlobBuilder`].
///
/// Builders request a buffer whenever their writable chunk runs out of space, and hand buffers
/// back when they are cleared or dropped. The returned buffer's length is its capacity and must
/// be at least `min_capacity`; its contents must be zeroed.
pub trait ChunkAllocator: Send + Sync + fmt::Debug {
    /// Provide a zeroed buffer of at least `min_capacity` bytes.
    fn allocate(&self, min_capacity: usize) -> Vec<u8>;

    /// Take back a buffer that is no longer referenced by any builder.
    fn free(&self, buffer: Vec<u8>);
}

/// Allocates every chunk fresh from the heap and drops freed chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl ChunkAllocator for HeapAllocator {
    fn allocate(&self, min_capacity: usize) -> Vec<u8> {
        vec![0; min_capacity]
    }

    fn free(&self, _buffer: Vec<u8>) {}
}

/// Recycles chunks of one fixed size between builders.
///
/// Shared through an `Arc` by all builders of one serialization pass, so the many short-lived
/// builders used for table rows and heaps reuse each other's memory. Requests larger than the
/// pooled chunk size bypass the pool.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use metascope::blob::{BlobBuilder, PooledAllocator};
///
/// let pool = Arc::new(PooledAllocator::new(64, 8));
/// {
///     let mut builder = BlobBuilder::with_allocator(64, pool.clone());
///     builder.write_bytes(&[1u8; 100])?;
/// }
/// assert_eq!(pool.pooled(), 2);
/// # Ok::<(), metascope::Error>(())
/// ```
pub struct PooledAllocator {
    chunk_size: usize,
    max_pooled: usize,
    pool: Mutex<Vec<Vec<u8>>>,
}

impl PooledAllocator {
    /// Create a pool handing out `chunk_size` byte chunks and retaining at most `max_pooled`
    /// freed chunks.
    #[must_use]
    pub fn new(chunk_size: usize, max_pooled: usize) -> Self {
        PooledAllocator {
            chunk_size,
            max_pooled,
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Number of chunks currently waiting for reuse.
    #[must_use]
    pub fn pooled(&self) -> usize {
        lock!(self.pool).len()
    }
}

impl fmt::Debug for PooledAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledAllocator")
            .field("chunk_size", &self.chunk_size)
            .field("max_pooled", &self.max_pooled)
            .field("pooled", &self.pooled())
            .finish()
    }
}

impl ChunkAllocator for PooledAllocator {
    fn allocate(&self, min_capacity: usize) -> Vec<u8> {
        if min_capacity > self.chunk_size {
            return vec![0; min_capacity];
        }

        lock!(self.pool)
            .pop()
            .unwrap_or_else(|| vec![0; self.chunk_size])
    }

    fn free(&self, mut buffer: Vec<u8>) {
        if buffer.len() != self.chunk_size {
            return;
        }

        let mut pool = lock!(self.pool);
        if pool.len() < self.max_pooled {
            buffer.fill(0);
            pool.push(buffer);
        }
    }
}
