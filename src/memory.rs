// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Byte accounting for device allocations.
//!
//! Backends record every allocation and free in a [`MemoryTracker`], which gives
//! live and peak byte counts for diagnostics. The host backend also uses the
//! tracker's limit to simulate a device running out of memory.
//!
//! ## Design Decisions
//!
//! - **No global state**: each backend owns its tracker, so two backends in one
//!   process (a CUDA device and a host simulation in tests) never mix numbers.
//! - **Element counts in, bytes out**: callers size buffers in elements; the
//!   sizing helpers convert using `size_of::<T>()`.

use crate::error::{DevMemError, DeviceOp, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bytes needed for `count` elements of `T`, or `None` on overflow.
#[must_use]
pub fn checked_buffer_bytes<T>(count: usize) -> Option<usize> {
    count.checked_mul(std::mem::size_of::<T>())
}

/// Bytes needed for `count` elements of `T`.
///
/// ## Example
///
/// ```rust
/// use rust_ai_devmem::estimate_buffer_bytes;
///
/// assert_eq!(estimate_buffer_bytes::<f32>(1024), 4096);
/// ```
#[must_use]
pub fn estimate_buffer_bytes<T>(count: usize) -> usize {
    count * std::mem::size_of::<T>()
}

/// Memory usage tracker for device allocations.
///
/// Tracks allocated and peak bytes. Thread-safe via atomics.
///
/// ## Why This Exists
///
/// Driver allocations are opaque: once a pointer comes back there is no cheap
/// way to ask the runtime how much this process holds. Recording sizes at the
/// allocation site gives live and peak numbers for logs, and a non-zero limit
/// lets the host backend fail the way a full device would.
///
/// ```rust
/// use rust_ai_devmem::MemoryTracker;
///
/// let tracker = MemoryTracker::new();
/// tracker.allocate(1024 * 1024).expect("no limit set");
/// tracker.deallocate(1024 * 1024);
/// assert_eq!(tracker.peak_bytes(), 1024 * 1024);
/// ```
#[derive(Debug)]
pub struct MemoryTracker {
    /// Currently allocated bytes.
    allocated: AtomicUsize,
    /// Peak allocation during lifetime.
    peak: AtomicUsize,
    /// Optional memory limit (0 = unlimited).
    limit: AtomicUsize,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    /// Create a new memory tracker with no limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(0)
    }

    /// Create a tracker that refuses allocations beyond `limit_bytes`.
    ///
    /// ## Arguments
    ///
    /// * `limit_bytes` - Ceiling on live bytes. `0` means unlimited.
    #[must_use]
    pub fn with_limit(limit_bytes: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            limit: AtomicUsize::new(limit_bytes),
        }
    }

    /// Record a memory allocation, enforcing the limit.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceOp::Allocate`] device error if the allocation would
    /// exceed the limit. Nothing is recorded in that case.
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        // Check limit BEFORE updating state to avoid partial updates on failure
        self.check_limit(bytes)?;
        self.record_allocation(bytes);
        Ok(())
    }

    /// Check that `bytes` more would stay within the limit, recording nothing.
    ///
    /// # Errors
    ///
    /// Returns the same out-of-memory error [`allocate`](Self::allocate) would.
    pub fn check_limit(&self, bytes: usize) -> Result<()> {
        let limit = self.limit.load(Ordering::SeqCst);
        let current = self.allocated.load(Ordering::SeqCst);
        let new_allocated = current.saturating_add(bytes);

        if limit > 0 && new_allocated > limit {
            return Err(DevMemError::device(
                DeviceOp::Allocate,
                format!(
                    "out of memory: {bytes} bytes requested, limit {limit} bytes \
                     (current: {current} bytes)"
                ),
            ));
        }
        Ok(())
    }

    /// Record an allocation the runtime has already granted.
    ///
    /// Unlike [`allocate`](Self::allocate) this never checks the limit: the
    /// memory exists, so the count has to reflect it.
    pub fn record_allocation(&self, bytes: usize) {
        let actual_new = self.allocated.fetch_add(bytes, Ordering::SeqCst) + bytes;

        let mut current_peak = self.peak.load(Ordering::SeqCst);
        while actual_new > current_peak {
            match self.peak.compare_exchange_weak(
                current_peak,
                actual_new,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(p) => current_peak = p,
            }
        }
    }

    /// Record a memory deallocation.
    pub fn deallocate(&self, bytes: usize) {
        // Saturate so a stray double free cannot wrap the counter.
        let _ = self
            .allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                Some(cur.saturating_sub(bytes))
            });
    }

    /// Get currently allocated bytes.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Get peak allocation during tracker lifetime.
    #[must_use]
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Get configured memory limit (0 = unlimited).
    #[must_use]
    pub fn limit_bytes(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }
}
