// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! In-process device simulation.
//!
//! `HostMemory` hands out fake device addresses backed by host `Vec<u8>`s. It
//! behaves like a device runtime from the caller's point of view (allocations
//! are opaque addresses, copies go through the backend) and counts every call,
//! which is what buffer-policy tests assert on.
//!
//! Addresses are never reused: each allocation starts past the end of the
//! previous one. A stale pointer therefore can never alias a newer buffer, and
//! freeing it twice is detected as an invalid free.

use crate::error::{DevMemError, DeviceOp, Result};
use crate::logging::log_memory_usage;
use crate::memory::MemoryTracker;
use crate::traits::DeviceMemory;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// First address handed out. Any non-zero value works; this one is easy to
/// spot in logs.
const HOST_BASE_ADDR: u64 = 0x7000_0000_0000;

/// Allocation alignment, matching what CUDA guarantees for `cuMemAlloc`.
const DEVICE_ALLOC_ALIGN: u64 = 256;

/// Round `size` up to a multiple of `align` (a power of two), or `None` on overflow.
fn align_up(size: u64, align: u64) -> Option<u64> {
    size.checked_add(align - 1).map(|s| s & !(align - 1))
}

/// Call counters and occupancy for a [`HostMemory`] backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Successful allocations.
    pub allocs: usize,
    /// Successful frees.
    pub frees: usize,
    /// Frees of addresses that were not a live allocation (double frees).
    pub invalid_frees: usize,
    /// Host to device copies that reached the runtime.
    pub copies_to_device: usize,
    /// Device to host copies that reached the runtime.
    pub copies_to_host: usize,
    /// Allocations currently alive.
    pub live_allocations: usize,
    /// Bytes currently allocated.
    pub live_bytes: usize,
    /// Highest `live_bytes` seen.
    pub peak_bytes: usize,
}

impl MemoryStats {
    /// Total calls that reached the runtime, including failed frees.
    #[must_use]
    pub fn runtime_calls(&self) -> usize {
        self.allocs + self.frees + self.invalid_frees + self.copies_to_device + self.copies_to_host
    }
}

#[derive(Debug)]
struct HostHeap {
    allocations: BTreeMap<u64, Vec<u8>>,
    next_addr: u64,
    stats: MemoryStats,
}

impl HostHeap {
    /// Find the allocation containing `[addr, addr + len)`.
    fn region_mut(&mut self, addr: u64, len: usize) -> Option<&mut [u8]> {
        let (&base, data) = self.allocations.range_mut(..=addr).next_back()?;
        let start = usize::try_from(addr - base).ok()?;
        let end = start.checked_add(len)?;
        data.get_mut(start..end)
    }
}

/// Simulated device memory living in host RAM.
///
/// ```rust
/// use rust_ai_devmem::backend::HostMemory;
/// use rust_ai_devmem::ops;
///
/// let mem = HostMemory::new();
/// let ptr = ops::allocate::<f32, _>(&mem, 16)?;
/// ops::copy_to_device(&mem, ptr, Some(&[1.0f32; 16][..]), 16)?;
/// unsafe { ops::release(&mem, ptr) };
/// assert_eq!(mem.stats().live_allocations, 0);
/// # Ok::<(), rust_ai_devmem::DevMemError>(())
/// ```
#[derive(Debug)]
pub struct HostMemory {
    name: String,
    heap: Mutex<HostHeap>,
    tracker: MemoryTracker,
}

impl Default for HostMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMemory {
    /// Create an unlimited host backend.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker(MemoryTracker::new())
    }

    /// Create a host backend that reports out-of-memory past `limit_bytes`.
    #[must_use]
    pub fn with_limit(limit_bytes: usize) -> Self {
        Self::with_tracker(MemoryTracker::with_limit(limit_bytes))
    }

    fn with_tracker(tracker: MemoryTracker) -> Self {
        Self {
            name: "host".to_string(),
            heap: Mutex::new(HostHeap {
                allocations: BTreeMap::new(),
                next_addr: HOST_BASE_ADDR,
                stats: MemoryStats::default(),
            }),
            tracker,
        }
    }

    /// Override the name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Snapshot of call counters and occupancy.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        self.heap.lock().stats
    }

    /// Byte tracker backing the limit.
    #[must_use]
    pub fn tracker(&self) -> &MemoryTracker {
        &self.tracker
    }

    /// Whether `addr` is the base of a live allocation.
    #[must_use]
    pub fn is_live(&self, addr: u64) -> bool {
        self.heap.lock().allocations.contains_key(&addr)
    }
}

impl DeviceMemory for HostMemory {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn alloc_bytes(&self, bytes: usize) -> Result<u64> {
        let out_of_memory = |reason: &str| {
            DevMemError::device(
                DeviceOp::Allocate,
                format!("out of memory: {bytes} bytes requested ({reason})"),
            )
        };

        let span = u64::try_from(bytes)
            .ok()
            .and_then(|b| align_up(b, DEVICE_ALLOC_ALIGN))
            .ok_or_else(|| out_of_memory("size overflows the address space"))?
            .max(DEVICE_ALLOC_ALIGN);

        self.tracker.check_limit(bytes)?;

        // Reserve fallibly so an unsatisfiable request is an error, not an abort.
        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|e| out_of_memory(&e.to_string()))?;
        data.resize(bytes, 0u8);

        self.tracker.allocate(bytes)?;

        let mut heap = self.heap.lock();
        let addr = heap.next_addr;
        let Some(next_addr) = addr.checked_add(span) else {
            drop(heap);
            self.tracker.deallocate(bytes);
            return Err(out_of_memory("address space exhausted"));
        };
        heap.next_addr = next_addr;
        heap.allocations.insert(addr, data);

        let stats = &mut heap.stats;
        stats.allocs += 1;
        stats.live_allocations += 1;
        stats.live_bytes += bytes;
        stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        drop(heap);

        log_memory_usage(self.tracker.allocated_bytes(), self.tracker.peak_bytes(), &self.name);
        Ok(addr)
    }

    unsafe fn free_bytes(&self, addr: u64) -> Result<()> {
        let mut heap = self.heap.lock();
        let Some(data) = heap.allocations.remove(&addr) else {
            heap.stats.invalid_frees += 1;
            return Err(DevMemError::device(
                DeviceOp::Release,
                format!("0x{addr:x} is not a live allocation"),
            ));
        };

        let stats = &mut heap.stats;
        stats.frees += 1;
        stats.live_allocations -= 1;
        stats.live_bytes -= data.len();
        drop(heap);

        self.tracker.deallocate(data.len());
        Ok(())
    }

    fn copy_htod(&self, dst: u64, src: &[u8]) -> Result<()> {
        let mut heap = self.heap.lock();
        heap.stats.copies_to_device += 1;
        let region = heap.region_mut(dst, src.len()).ok_or_else(|| {
            DevMemError::device(
                DeviceOp::CopyToDevice,
                format!("invalid device range 0x{dst:x}+{}", src.len()),
            )
        })?;
        region.copy_from_slice(src);
        Ok(())
    }

    fn copy_dtoh(&self, dst: &mut [u8], src: u64) -> Result<()> {
        let mut heap = self.heap.lock();
        heap.stats.copies_to_host += 1;
        let region = heap.region_mut(src, dst.len()).ok_or_else(|| {
            DevMemError::device(
                DeviceOp::CopyToHost,
                format!("invalid device range 0x{src:x}+{}", dst.len()),
            )
        })?;
        dst.copy_from_slice(region);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_are_aligned_and_never_reused() {
        let mem = HostMemory::new();
        let a = mem.alloc_bytes(10).unwrap();
        unsafe { mem.free_bytes(a).unwrap() };
        let b = mem.alloc_bytes(10).unwrap();

        assert_ne!(a, b);
        assert_eq!(a % DEVICE_ALLOC_ALIGN, 0);
        assert_eq!(b % DEVICE_ALLOC_ALIGN, 0);
        assert!(!mem.is_live(a));
        assert!(mem.is_live(b));
    }

    #[test]
    fn test_double_free_is_counted() {
        let mem = HostMemory::new();
        let a = mem.alloc_bytes(64).unwrap();
        unsafe {
            mem.free_bytes(a).unwrap();
            assert!(mem.free_bytes(a).is_err());
        }
        let stats = mem.stats();
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.invalid_frees, 1);
    }

    #[test]
    fn test_limit_reports_out_of_memory() {
        let mem = HostMemory::with_limit(100);
        let a = mem.alloc_bytes(80).unwrap();
        let err = mem.alloc_bytes(40).unwrap_err();
        assert_eq!(err.device_op(), Some(DeviceOp::Allocate));
        assert!(err.to_string().contains("out of memory"));

        unsafe { mem.free_bytes(a).unwrap() };
        assert!(mem.alloc_bytes(40).is_ok());
        assert_eq!(mem.stats().peak_bytes, 80);
    }

    #[test]
    fn test_align_up_rounds_and_detects_overflow() {
        assert_eq!(align_up(0, DEVICE_ALLOC_ALIGN), Some(0));
        assert_eq!(align_up(1, DEVICE_ALLOC_ALIGN), Some(256));
        assert_eq!(align_up(512, DEVICE_ALLOC_ALIGN), Some(512));
        assert_eq!(align_up(u64::MAX - 10, DEVICE_ALLOC_ALIGN), None);
    }

    #[test]
    fn test_unsatisfiable_request_is_out_of_memory() {
        let mem = HostMemory::new();
        let err = mem.alloc_bytes(1usize << 46).unwrap_err();
        assert_eq!(err.device_op(), Some(DeviceOp::Allocate));
        assert!(err.to_string().contains("out of memory"));

        // Nothing stays recorded after the failure.
        assert_eq!(mem.tracker().allocated_bytes(), 0);
        assert_eq!(mem.tracker().peak_bytes(), 0);
        assert_eq!(mem.stats(), MemoryStats::default());
        assert!(mem.alloc_bytes(16).is_ok());
    }

    #[test]
    fn test_interior_copies() {
        let mem = HostMemory::new();
        let base = mem.alloc_bytes(8).unwrap();
        mem.copy_htod(base + 4, &[9, 9, 9, 9]).unwrap();

        let mut out = [0u8; 8];
        mem.copy_dtoh(&mut out, base).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 9, 9, 9, 9]);

        assert!(mem.copy_htod(base + 6, &[1, 1, 1, 1]).is_err());
        assert!(mem.copy_dtoh(&mut out, base - 1).is_err());
    }
}
