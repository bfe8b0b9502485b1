// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Typed device memory operations.
//!
//! Four stateless, blocking calls over a [`DeviceMemory`] backend. Sizes are
//! element counts of `T`, never bytes.
//!
//! | Operation | Null handling | Failure |
//! |-----------|---------------|---------|
//! | [`allocate`] | `count == 0` yields null | device error |
//! | [`release`] | no-op on null | logged, never returned |
//! | [`copy_to_device`] | skipped if either side is null | device error |
//! | [`copy_to_host`] | skipped if either side is null | device error |
//!
//! Allocation is checked and release is not: a failing free leaves nothing the
//! caller could do, so it is only logged.

use crate::error::{DevMemError, DeviceOp, Result};
use crate::memory::checked_buffer_bytes;
use crate::ptr::DevicePtr;
use crate::traits::DeviceMemory;
use bytemuck::Pod;

/// Allocate device memory for `count` elements of `T`.
///
/// A zero-element request returns the null pointer without touching the
/// runtime.
///
/// # Errors
///
/// Returns a [`DeviceOp::Allocate`] device error if the runtime fails (e.g. out
/// of memory) or the byte size overflows.
pub fn allocate<T: Pod, M: DeviceMemory + ?Sized>(
    memory: &M,
    count: usize,
) -> Result<DevicePtr<T>> {
    if count == 0 {
        return Ok(DevicePtr::null());
    }
    let bytes = checked_buffer_bytes::<T>(count).ok_or_else(|| {
        DevMemError::device(
            DeviceOp::Allocate,
            format!("{count} elements of {} bytes overflow usize", std::mem::size_of::<T>()),
        )
    })?;

    let ptr = DevicePtr::from_addr(memory.alloc_bytes(bytes)?);
    tracing::trace!(
        target: "devmem::memory",
        backend = memory.name(),
        count,
        bytes,
        ptr = ?ptr,
        "allocated"
    );
    Ok(ptr)
}

/// Release device memory obtained from [`allocate`].
///
/// Does nothing for the null pointer. Runtime failures are logged at `warn`
/// and otherwise ignored.
///
/// # Safety
///
/// `ptr` must be null or come from [`allocate`] on the same backend, must not
/// have been released already, and must not be used afterwards.
pub unsafe fn release<T, M: DeviceMemory + ?Sized>(memory: &M, ptr: DevicePtr<T>) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: forwarded from this function's contract.
    if let Err(err) = unsafe { memory.free_bytes(ptr.addr()) } {
        tracing::warn!(
            target: "devmem::memory",
            backend = memory.name(),
            ptr = ?ptr,
            error = %err,
            "device free failed; ignoring"
        );
    } else {
        tracing::trace!(target: "devmem::memory", backend = memory.name(), ptr = ?ptr, "released");
    }
}

/// Copy `count` elements from host `src` to device `dst`, blocking.
///
/// Silently does nothing if `dst` is null or `src` is `None`.
///
/// # Errors
///
/// - `HostBufferTooSmall` if `src` holds fewer than `count` elements.
/// - A [`DeviceOp::CopyToDevice`] device error if the runtime fails.
pub fn copy_to_device<T: Pod, M: DeviceMemory + ?Sized>(
    memory: &M,
    dst: DevicePtr<T>,
    src: Option<&[T]>,
    count: usize,
) -> Result<()> {
    let Some(src) = src else {
        return Ok(());
    };
    if dst.is_null() {
        return Ok(());
    }
    if src.len() < count {
        return Err(DevMemError::host_too_small(
            DeviceOp::CopyToDevice,
            count,
            src.len(),
        ));
    }
    memory.copy_htod(dst.addr(), bytemuck::cast_slice(&src[..count]))
}

/// Copy `count` elements from device `src` to host `dst`, blocking.
///
/// Silently does nothing if `dst` is `None` or `src` is null.
///
/// # Errors
///
/// - `HostBufferTooSmall` if `dst` holds fewer than `count` elements.
/// - A [`DeviceOp::CopyToHost`] device error if the runtime fails.
pub fn copy_to_host<T: Pod, M: DeviceMemory + ?Sized>(
    memory: &M,
    dst: Option<&mut [T]>,
    src: DevicePtr<T>,
    count: usize,
) -> Result<()> {
    let Some(dst) = dst else {
        return Ok(());
    };
    if src.is_null() {
        return Ok(());
    }
    if dst.len() < count {
        return Err(DevMemError::host_too_small(
            DeviceOp::CopyToHost,
            count,
            dst.len(),
        ));
    }
    memory.copy_dtoh(bytemuck::cast_slice_mut(&mut dst[..count]), src.addr())
}
