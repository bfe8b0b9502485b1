// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Error types for device memory operations and buffer handles.
//!
//! ## Error Hierarchy
//!
//! ```text
//! DevMemError
//! ├── Device              - Device runtime reported a non-success status
//! ├── HostBufferTooSmall  - Host slice shorter than the requested element count
//! ├── InvalidConfig       - Configuration validation failures
//! └── DeviceNotAvailable  - Requested device could not be opened
//! ```
//!
//! Only [`DevMemError::Device`] comes from the runtime itself. It is never
//! retried inside this crate; the caller decides whether it is fatal.
//!
//! Crates embedding these handles can wrap the error in their own type:
//!
//! ```rust
//! use rust_ai_devmem::DevMemError;
//! use thiserror::Error;
//!
//! #[derive(Error, Debug)]
//! pub enum SolverError {
//!     #[error("diverged after {0} iterations")]
//!     Diverged(usize),
//!
//!     #[error(transparent)]
//!     DevMem(#[from] DevMemError),
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Result type alias for device memory operations.
pub type Result<T> = std::result::Result<T, DevMemError>;

/// The runtime call that produced a [`DevMemError::Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    /// Device allocation.
    Allocate,
    /// Device free. Failures here are logged, never returned.
    Release,
    /// Blocking host to device copy.
    CopyToDevice,
    /// Blocking device to host copy.
    CopyToHost,
}

impl DeviceOp {
    /// Short name used in log fields and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allocate => "allocate",
            Self::Release => "release",
            Self::CopyToDevice => "copy_to_device",
            Self::CopyToHost => "copy_to_host",
        }
    }
}

impl fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by device memory operations and buffer handles.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DevMemError {
    /// The device runtime returned a non-success status.
    ///
    /// Out-of-memory on allocation lands here as well; the message carries the
    /// runtime's own description.
    #[error("device error during {op}: {message}")]
    Device {
        /// Operation that failed.
        op: DeviceOp,
        /// Runtime status description.
        message: String,
    },

    /// A host slice holds fewer elements than the transfer needs.
    #[error("host buffer too small for {op}: {required} elements required, {actual} available")]
    HostBufferTooSmall {
        /// Copy direction.
        op: DeviceOp,
        /// Elements the transfer was asked to move.
        required: usize,
        /// Elements the host slice actually holds.
        actual: usize,
    },

    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Requested device not available.
    #[error("device not available: {device}")]
    DeviceNotAvailable {
        /// Description of the unavailable device.
        device: String,
    },
}

impl DevMemError {
    /// Create a device runtime error for `op`.
    pub fn device(op: DeviceOp, msg: impl Into<String>) -> Self {
        Self::Device {
            op,
            message: msg.into(),
        }
    }

    /// Create a host-buffer-too-small error.
    #[must_use]
    pub fn host_too_small(op: DeviceOp, required: usize, actual: usize) -> Self {
        Self::HostBufferTooSmall {
            op,
            required,
            actual,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a device not available error.
    pub fn device_not_available(device: impl Into<String>) -> Self {
        Self::DeviceNotAvailable {
            device: device.into(),
        }
    }

    /// The failing runtime operation, if this error came from the runtime.
    #[must_use]
    pub fn device_op(&self) -> Option<DeviceOp> {
        match self {
            Self::Device { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Whether the device runtime itself reported this error.
    #[must_use]
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}

#[cfg(feature = "cuda")]
impl DevMemError {
    /// Attach the failing operation to a cudarc driver error.
    pub(crate) fn from_driver(op: DeviceOp, err: &cudarc::driver::DriverError) -> Self {
        Self::device(op, err.to_string())
    }
}
