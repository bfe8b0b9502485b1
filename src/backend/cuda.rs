// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! CUDA driver backend.
//!
//! Talks to the driver through cudarc's `result` layer so that allocations are
//! plain `CUdeviceptr`s: ownership stays with [`DeviceBuffer`](crate::DeviceBuffer)
//! rather than with a cudarc `CudaSlice`. Every call binds the device's primary
//! context to the calling thread first.

use crate::error::{DevMemError, DeviceOp, Result};
use crate::logging::log_memory_usage;
use crate::memory::MemoryTracker;
use crate::traits::DeviceMemory;
use cudarc::driver::{result, CudaDevice};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Device memory on a CUDA GPU.
pub struct CudaMemory {
    device: Arc<CudaDevice>,
    ordinal: usize,
    name: String,
    tracker: MemoryTracker,
    /// Live allocation sizes, for byte accounting on free.
    sizes: Mutex<HashMap<u64, usize>>,
}

impl CudaMemory {
    /// Open CUDA device `ordinal`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotAvailable` if the driver cannot open the device.
    pub fn new(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal).map_err(|e| {
            DevMemError::device_not_available(format!("CUDA:{ordinal} ({e})"))
        })?;
        tracing::info!(target: "devmem::device", ordinal, "opened CUDA device");
        Ok(Self {
            device,
            ordinal,
            name: format!("cuda:{ordinal}"),
            tracker: MemoryTracker::new(),
            sizes: Mutex::new(HashMap::new()),
        })
    }

    /// Device ordinal.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Byte tracker for allocations made through this backend.
    #[must_use]
    pub fn tracker(&self) -> &MemoryTracker {
        &self.tracker
    }

    fn bind(&self, op: DeviceOp) -> Result<()> {
        self.device
            .bind_to_thread()
            .map_err(|e| DevMemError::from_driver(op, &e))
    }
}

impl fmt::Debug for CudaMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaMemory")
            .field("ordinal", &self.ordinal)
            .field("allocated_bytes", &self.tracker.allocated_bytes())
            .finish_non_exhaustive()
    }
}

impl DeviceMemory for CudaMemory {
    fn name(&self) -> &str {
        &self.name
    }

    fn alloc_bytes(&self, bytes: usize) -> Result<u64> {
        self.bind(DeviceOp::Allocate)?;
        // SAFETY: the context is bound; the returned pointer is owned by the caller.
        let addr = unsafe { result::malloc_sync(bytes) }
            .map_err(|e| DevMemError::from_driver(DeviceOp::Allocate, &e))?;

        self.sizes.lock().insert(addr, bytes);
        self.tracker.record_allocation(bytes);
        log_memory_usage(self.tracker.allocated_bytes(), self.tracker.peak_bytes(), &self.name);
        Ok(addr)
    }

    unsafe fn free_bytes(&self, addr: u64) -> Result<()> {
        self.bind(DeviceOp::Release)?;
        // SAFETY: caller guarantees `addr` is a live allocation from `alloc_bytes`.
        unsafe { result::free_sync(addr) }
            .map_err(|e| DevMemError::from_driver(DeviceOp::Release, &e))?;

        if let Some(bytes) = self.sizes.lock().remove(&addr) {
            self.tracker.deallocate(bytes);
        }
        Ok(())
    }

    fn copy_htod(&self, dst: u64, src: &[u8]) -> Result<()> {
        self.bind(DeviceOp::CopyToDevice)?;
        // SAFETY: `src` is a live host slice bounding the transfer; the driver
        // validates `dst` and reports bad ranges as a status.
        unsafe { result::memcpy_htod_sync(dst, src) }
            .map_err(|e| DevMemError::from_driver(DeviceOp::CopyToDevice, &e))
    }

    fn copy_dtoh(&self, dst: &mut [u8], src: u64) -> Result<()> {
        self.bind(DeviceOp::CopyToHost)?;
        // SAFETY: `dst` is an exclusive host slice bounding the transfer.
        unsafe { result::memcpy_dtoh_sync(dst, src) }
            .map_err(|e| DevMemError::from_driver(DeviceOp::CopyToHost, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    #[test]
    #[ignore = "Requires CUDA GPU"]
    fn test_cuda_round_trip() {
        let mem = CudaMemory::new(0).expect("CUDA device 0");
        let ptr = ops::allocate::<f32, _>(&mem, 256).unwrap();
        let input: Vec<f32> = (0..256).map(|i| i as f32).collect();
        ops::copy_to_device(&mem, ptr, Some(&input[..]), 256).unwrap();

        let mut output = vec![0.0f32; 256];
        ops::copy_to_host(&mem, Some(&mut output[..]), ptr, 256).unwrap();
        assert_eq!(input, output);

        unsafe { ops::release(&mem, ptr) };
        assert_eq!(mem.tracker().allocated_bytes(), 0);
    }
}
