//! Process-wide counting semaphores.
//!
//! A bisection session is strictly sequential, but several sessions may
//! run in one process. Two semaphores, one gating builds and one gating
//! test runs, bound that cross-session parallelism. The builder and
//! test-runner adapters acquire them; the driver itself never does.

use std::sync::{Arc, Condvar, Mutex};

/// Counting semaphore with RAII permits.
///
/// Clones share the same permit pool.
#[derive(Debug, Clone)]
pub struct Semaphore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with `permits` concurrent permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                permits: Mutex::new(permits),
                available: Condvar::new(),
            }),
        }
    }

    /// Blocks until a permit is available and takes it.
    ///
    /// The permit is returned when the guard is dropped.
    #[must_use]
    pub fn acquire(&self) -> SemaphoreGuard {
        let mut permits = self
            .inner
            .permits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        while *permits == 0 {
            permits = self
                .inner
                .available
                .wait(permits)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        *permits -= 1;
        SemaphoreGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Permit held while a gated operation runs.
#[derive(Debug)]
pub struct SemaphoreGuard {
    inner: Arc<Inner>,
}

impl Drop for SemaphoreGuard {
    fn drop(&mut self) {
        let mut permits = self
            .inner
            .permits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *permits += 1;
        self.inner.available.notify_one();
    }
}
