// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Seams between the buffer handle and its surroundings.
//!
//! ## Core Traits
//!
//! - [`DeviceMemory`] - Byte-level device runtime (allocate, free, copy)
//! - [`ValidatableConfig`] - Configuration validation interface
//!
//! [`DeviceMemory`] is what makes the handle's policy testable without a GPU:
//! production code plugs in [`CudaMemory`](crate::backend::CudaMemory) (feature
//! `cuda`), tests plug in [`HostMemory`](crate::backend::HostMemory).

use crate::error::Result;
use std::fmt;

/// Configuration validation trait.
///
/// # Example
///
/// ```rust
/// use rust_ai_devmem::{DevMemError, Result, ValidatableConfig};
///
/// #[derive(Clone)]
/// struct StagingConfig {
///     chunk_elems: usize,
/// }
///
/// impl ValidatableConfig for StagingConfig {
///     fn validate(&self) -> Result<()> {
///         if self.chunk_elems == 0 {
///             return Err(DevMemError::invalid_config("chunk_elems must be > 0"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ValidatableConfig: Clone + Send + Sync {
    /// Validate the configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns `DevMemError::InvalidConfig` if validation fails.
    fn validate(&self) -> Result<()>;
}

/// A synchronous device runtime, addressed in bytes.
///
/// Implementations translate their runtime's status codes into
/// [`DevMemError::Device`](crate::DevMemError::Device) right after each call.
/// They hold no buffer policy: element types, null-skipping and the
/// unchecked-release rule live in [`ops`](crate::ops).
///
/// Every call blocks until the runtime has finished. Implementations must be
/// safe to call from several threads on unrelated allocations.
pub trait DeviceMemory: Send + Sync + fmt::Debug {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    /// Whether addresses from this backend are host-side stand-ins that no
    /// kernel can dereference.
    fn is_simulated(&self) -> bool {
        false
    }

    /// Allocate `bytes` bytes of device memory and return the address.
    ///
    /// `bytes` is never zero.
    ///
    /// # Errors
    ///
    /// Returns a device error if the runtime reports a non-success status.
    fn alloc_bytes(&self, bytes: usize) -> Result<u64>;

    /// Free an allocation previously returned by [`alloc_bytes`](Self::alloc_bytes).
    ///
    /// `addr` is never zero. The returned status is only logged by callers.
    ///
    /// # Errors
    ///
    /// Returns a device error if the runtime rejects the free.
    ///
    /// # Safety
    ///
    /// `addr` must come from `alloc_bytes` on this backend, must not have been
    /// freed already, and must not be used afterwards.
    unsafe fn free_bytes(&self, addr: u64) -> Result<()>;

    /// Copy `src` into device memory starting at `dst`.
    ///
    /// # Errors
    ///
    /// Returns a device error if the runtime reports a non-success status.
    fn copy_htod(&self, dst: u64, src: &[u8]) -> Result<()>;

    /// Copy `dst.len()` bytes of device memory starting at `src` into `dst`.
    ///
    /// # Errors
    ///
    /// Returns a device error if the runtime reports a non-success status.
    fn copy_dtoh(&self, dst: &mut [u8], src: u64) -> Result<()>;
}
