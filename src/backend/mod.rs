// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! [`DeviceMemory`](crate::DeviceMemory) implementations.
//!
//! - [`HostMemory`] - in-process simulation with call accounting
//! - `CudaMemory` - CUDA driver API (feature `cuda`)

mod host;

#[cfg(feature = "cuda")]
mod cuda;

pub use host::{HostMemory, MemoryStats};

#[cfg(feature = "cuda")]
pub use cuda::CudaMemory;
