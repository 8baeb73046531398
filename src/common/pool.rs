//! Pooled datagram buffers
//!
//! Buffers are acquired before a read and travel with whichever path
//! consumes them (hijack relay or forwarded packet); the guard returns the
//! buffer to the pool exactly once, on drop.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Maximum expected datagram payload.
pub const UDP_BUFFER_SIZE: usize = 64 * 1024;

/// Fixed-size buffer pool
pub struct BufferPool {
    size: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            size,
            free: Mutex::new(Vec::new()),
        })
    }

    /// Take a buffer from the pool, allocating when the free list is empty.
    pub fn acquire(self: &Arc<Self>) -> PooledBuf {
        let buf = self
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_else(|| vec![0u8; self.size]);
        PooledBuf {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, buf: Vec<u8>) {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).push(buf);
    }

    #[cfg(test)]
    fn free_count(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

/// Buffer checked out of a [`BufferPool`]; returned on drop.
pub struct PooledBuf {
    buf: Option<Vec<u8>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
