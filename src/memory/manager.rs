use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;

/// Backend-owned pooled memory resource.
///
/// `acquire` and `release` bracket each inference invocation. Between the two
/// calls a manager may hand out pooled buffers through `allocate`; outside of
/// them allocations fall back to fresh zeroed memory.
pub trait MemoryManager: Send + Sync + Debug {
    /// Make pooled memory available for the next inference
    fn acquire(&self);

    /// Give pooled memory back once the inference has finished
    fn release(&self);

    /// Allocate a zero-filled buffer of `num_bytes`
    fn allocate(&self, num_bytes: usize) -> BytesMut {
        BytesMut::zeroed(num_bytes)
    }

    /// Return a buffer to the pool once no handle references it anymore
    fn recycle(&self, _buffer: BytesMut) {}
}

/// Whether two shared managers are the same object, ignoring vtable identity
pub fn same_manager(a: &Arc<dyn MemoryManager>, b: &Arc<dyn MemoryManager>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Host memory manager that keeps released tensor buffers for reuse while acquired
#[derive(Debug, Default)]
pub struct HostMemoryManager {
    acquired: AtomicBool,
    acquisitions: AtomicUsize,
    pool: Mutex<Vec<BytesMut>>,
}

impl HostMemoryManager {
    /// Create a new host memory manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the manager is currently between `acquire` and `release`
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    /// Number of times `acquire` has been called
    pub fn acquisition_count(&self) -> usize {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Number of buffers waiting in the pool
    pub fn pooled_buffers(&self) -> usize {
        match self.pool.lock() {
            Ok(pool) => pool.len(),
            Err(_) => 0,
        }
    }
}

impl MemoryManager for HostMemoryManager {
    fn acquire(&self) {
        self.acquired.store(true, Ordering::Release);
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self) {
        self.acquired.store(false, Ordering::Release);
        if let Ok(mut pool) = self.pool.lock() {
            log::trace!("Releasing {} pooled host buffers", pool.len());
            pool.clear();
        }
    }

    fn allocate(&self, num_bytes: usize) -> BytesMut {
        if self.is_acquired() {
            if let Ok(mut pool) = self.pool.lock() {
                if let Some(index) = pool.iter().position(|buf| buf.capacity() >= num_bytes) {
                    let mut buffer = pool.swap_remove(index);
                    buffer.clear();
                    buffer.resize(num_bytes, 0);
                    return buffer;
                }
            }
        }

        BytesMut::zeroed(num_bytes)
    }

    fn recycle(&self, buffer: BytesMut) {
        if !self.is_acquired() {
            return;
        }

        if let Ok(mut pool) = self.pool.lock() {
            pool.push(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuse_only_while_acquired() {
        let manager = HostMemoryManager::new();

        // Not acquired: recycled buffers are dropped
        manager.recycle(BytesMut::zeroed(64));
        assert_eq!(manager.pooled_buffers(), 0);

        manager.acquire();
        manager.recycle(BytesMut::zeroed(64));
        assert_eq!(manager.pooled_buffers(), 1);

        let buffer = manager.allocate(32);
        assert_eq!(buffer.len(), 32);
        assert!(buffer.iter().all(|&b| b == 0));
        assert_eq!(manager.pooled_buffers(), 0);

        manager.recycle(buffer);
        manager.release();
        assert_eq!(manager.pooled_buffers(), 0);
        assert!(!manager.is_acquired());
        assert_eq!(manager.acquisition_count(), 1);
    }
}
