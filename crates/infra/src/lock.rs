//! Per-product exclusive locks.
//!
//! Adjustments on the same product are serialized by holding that product's lock
//! for the whole apply phase; different products never contend. Acquisition is
//! bounded by a timeout so no caller blocks forever.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use stockledger_core::ProductId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for product {product_id}")]
    Timeout {
        product_id: ProductId,
        waited: Duration,
    },

    #[error("lock table poisoned")]
    Poisoned,
}

/// Table of currently held product locks.
#[derive(Debug, Default)]
pub struct ProductLocks {
    held: Mutex<HashSet<ProductId>>,
    released: Condvar,
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `product_id` is free (or `timeout` elapses), then hold it until
    /// the returned guard is dropped.
    pub fn acquire(
        &self,
        product_id: ProductId,
        timeout: Duration,
    ) -> Result<ProductLockGuard<'_>, LockError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;

        while held.contains(&product_id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Timeout {
                    product_id,
                    waited: now - started,
                });
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| LockError::Poisoned)?;
            held = guard;
        }

        held.insert(product_id);
        Ok(ProductLockGuard {
            locks: self,
            product_id,
        })
    }

    pub fn is_locked(&self, product_id: ProductId) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&product_id))
            .unwrap_or(false)
    }

    fn release(&self, product_id: ProductId) {
        // Releasing must succeed even after a panic elsewhere poisoned the mutex.
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&product_id);
        drop(held);
        self.released.notify_all();
    }
}

/// Exclusive hold on one product; released on drop (commit, rollback or unwind).
#[derive(Debug)]
pub struct ProductLockGuard<'a> {
    locks: &'a ProductLocks,
    product_id: ProductId,
}

impl ProductLockGuard<'_> {
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }
}

impl Drop for ProductLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.release(self.product_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn second_acquire_times_out_while_held() {
        let locks = ProductLocks::new();
        let product = ProductId::new();
        let _guard = locks.acquire(product, Duration::from_millis(10)).unwrap();

        let err = locks.acquire(product, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, LockError::Timeout { product_id, .. } if product_id == product));
    }

    #[test]
    fn different_products_do_not_contend() {
        let locks = ProductLocks::new();
        let _a = locks.acquire(ProductId::new(), Duration::ZERO).unwrap();
        let _b = locks.acquire(ProductId::new(), Duration::ZERO).unwrap();
    }

    #[test]
    fn drop_releases_the_lock() {
        let locks = ProductLocks::new();
        let product = ProductId::new();
        {
            let guard = locks.acquire(product, Duration::ZERO).unwrap();
            assert_eq!(guard.product_id(), product);
            assert!(locks.is_locked(product));
        }
        assert!(!locks.is_locked(product));
        locks.acquire(product, Duration::ZERO).unwrap();
    }

    #[test]
    fn holders_never_overlap() {
        let locks = Arc::new(ProductLocks::new());
        let product = ProductId::new();
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = locks.acquire(product, Duration::from_secs(5)).unwrap();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
