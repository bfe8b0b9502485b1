// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! # rust-ai-devmem
//!
//! Device buffer handles for the rust-ai ecosystem: one handle type that either
//! owns a lazily grown GPU allocation or borrows a pointer someone else
//! allocated, so downstream code never has to care which.
//!
//! ## Design Philosophy
//!
//! **Free exactly what you allocated.** A [`DeviceBuffer`] releases its own
//! allocation once, at growth or on drop, and never touches a borrowed pointer.
//! The owned/borrowed switch is a tagged state, not a pair of nullable
//! pointers with precedence rules.
//!
//! **Runtime behind a trait.** All allocation and transfer goes through
//! [`DeviceMemory`], with a CUDA driver backend for production and an
//! in-process [`HostMemory`](backend::HostMemory) that counts calls for tests.
//!
//! ## Modules
//!
//! - [`buffer`] - Owned/borrowed buffer handle and its growth policy
//! - [`ops`] - Typed allocate / release / copy-in / copy-out
//! - [`backend`] - `DeviceMemory` implementations
//! - [`device`] - CUDA-first backend selection with environment overrides
//! - [`error`] - Error types
//! - [`memory`] - Byte accounting
//! - [`logging`] - Tracing setup
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_ai_devmem::{open_device, DeviceBuffer, DeviceConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let memory = open_device(&DeviceConfig::from_env().with_host_fallback(true))?;
//!
//!     let mut scratch: DeviceBuffer<f32> = DeviceBuffer::new(memory);
//!     scratch.upload(&[1.0, 2.0, 3.0])?;
//!     scratch.ensure_capacity(2)?; // already big enough
//!
//!     let mut back = [0.0f32; 3];
//!     scratch.download(&mut back)?;
//!     assert_eq!(back, [1.0, 2.0, 3.0]);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `cuda` - Enable the CUDA driver backend via cudarc

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod buffer;
pub mod device;
pub mod error;
pub mod logging;
pub mod memory;
pub mod ops;
pub mod ptr;
pub mod traits;

// Re-exports for convenience
pub use buffer::{BufferKind, DeviceBuffer};
pub use device::{open_device, warn_if_simulated, DeviceConfig};
pub use error::{DevMemError, DeviceOp, Result};
pub use logging::{init_logging, LogConfig, LogLevel};
pub use memory::{estimate_buffer_bytes, MemoryTracker};
pub use ops::{allocate, copy_to_device, copy_to_host, release};
pub use ptr::DevicePtr;
pub use traits::{DeviceMemory, ValidatableConfig};
