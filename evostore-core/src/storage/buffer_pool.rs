use crate::error::{EvoError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed byte budget shared by every buffer in flight or at rest on a node.
///
/// Acquisition never waits: a request that does not fit fails with
/// `ResourceExhausted` and leaves the pool untouched.
#[derive(Debug)]
pub struct BufferPool {
    capacity: u64,
    in_use: AtomicU64,
}

/// Capacity held on a [`BufferPool`]; returned when dropped.
#[derive(Debug)]
pub struct PoolLease {
    pool: Arc<BufferPool>,
    bytes: u64,
}

impl BufferPool {
    pub fn new(capacity: u64) -> Result<Arc<Self>> {
        if capacity == 0 {
            return Err(EvoError::Validation(
                "buffer pool capacity must be greater than zero".to_string(),
            ));
        }

        Ok(Arc::new(Self {
            capacity,
            in_use: AtomicU64::new(0),
        }))
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn available(&self) -> u64 {
        self.capacity.saturating_sub(self.in_use())
    }

    pub fn try_acquire(self: &Arc<Self>, bytes: u64) -> Result<PoolLease> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            let next = current
                .checked_add(bytes)
                .filter(|next| *next <= self.capacity)
                .ok_or(EvoError::ResourceExhausted {
                    requested: bytes,
                    available: self.capacity.saturating_sub(current),
                    capacity: self.capacity,
                })?;

            match self.in_use.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(PoolLease {
                        pool: self.clone(),
                        bytes,
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }
}

impl PoolLease {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
