// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! CUDA-first backend selection with environment variable overrides.
//!
//! [`open_device`] returns the [`DeviceMemory`] backend that buffer handles
//! allocate from. CUDA is always preferred. The host simulation is used only
//! when forced, or as an explicitly allowed fallback, and both cases warn.
//!
//! ## Environment Variables
//!
//! - `DEVMEM_FORCE_HOST` - `1` or `true` selects the host simulation
//! - `DEVMEM_CUDA_DEVICE` - CUDA device ordinal (e.g. `0`, `1`)
//! - `DEVMEM_ALLOW_HOST_FALLBACK` - `1` or `true` permits falling back to the
//!   host simulation when CUDA cannot be opened
//! - `DEVMEM_HOST_LIMIT` - byte limit for the host simulation
//!
//! The ecosystem-wide `RUST_AI_FORCE_CPU` and `RUST_AI_CUDA_DEVICE` are also
//! honoured.
//!
//! ## Example
//!
//! ```rust
//! use rust_ai_devmem::{open_device, DeviceBuffer, DeviceConfig};
//!
//! let memory = open_device(&DeviceConfig::new().with_force_host(true))?;
//! let mut buf: DeviceBuffer<f32> = DeviceBuffer::new(memory);
//! buf.ensure_capacity(1024)?;
//! # Ok::<(), rust_ai_devmem::DevMemError>(())
//! ```

use crate::backend::HostMemory;
use crate::error::{DevMemError, Result};
use crate::traits::{DeviceMemory, ValidatableConfig};
use std::sync::{Arc, Once};

const FORCE_HOST_VARS: [&str; 2] = ["DEVMEM_FORCE_HOST", "RUST_AI_FORCE_CPU"];
const CUDA_DEVICE_VARS: [&str; 2] = ["DEVMEM_CUDA_DEVICE", "RUST_AI_CUDA_DEVICE"];
const ALLOW_FALLBACK_VAR: &str = "DEVMEM_ALLOW_HOST_FALLBACK";
const HOST_LIMIT_VAR: &str = "DEVMEM_HOST_LIMIT";

/// Configuration for backend selection.
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Preferred CUDA device ordinal.
    pub cuda_device: usize,
    /// Use the host simulation instead of CUDA.
    pub force_host: bool,
    /// Fall back to the host simulation if CUDA cannot be opened.
    pub allow_host_fallback: bool,
    /// Byte limit for the host simulation (0 = unlimited).
    pub host_limit_bytes: usize,
    /// Crate name for logging (appears in warnings).
    pub crate_name: Option<String>,
}

fn is_truthy(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

impl DeviceConfig {
    /// Create a new device configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred CUDA device ordinal.
    #[must_use]
    pub fn with_cuda_device(mut self, ordinal: usize) -> Self {
        self.cuda_device = ordinal;
        self
    }

    /// Force the host simulation.
    #[must_use]
    pub fn with_force_host(mut self, force: bool) -> Self {
        self.force_host = force;
        self
    }

    /// Permit falling back to the host simulation.
    #[must_use]
    pub fn with_host_fallback(mut self, allow: bool) -> Self {
        self.allow_host_fallback = allow;
        self
    }

    /// Limit the host simulation to `bytes` (0 = unlimited).
    #[must_use]
    pub fn with_host_limit(mut self, bytes: usize) -> Self {
        self.host_limit_bytes = bytes;
        self
    }

    /// Set crate name for logging.
    #[must_use]
    pub fn with_crate_name(mut self, name: impl Into<String>) -> Self {
        self.crate_name = Some(name.into());
        self
    }

    /// Build configuration from environment variables.
    ///
    /// Unparseable values are ignored and the default kept.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build configuration from any variable source.
    ///
    /// [`from_env`](Self::from_env) passes the process environment; tests and
    /// embedders can pass a map instead.
    ///
    /// ## Arguments
    ///
    /// * `lookup` - Returns the value of a variable name, or `None` if unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |var: &str| lookup(var).is_some_and(|val| is_truthy(&val));
        let cuda_device = CUDA_DEVICE_VARS
            .iter()
            .find_map(|var| lookup(var)?.parse::<usize>().ok())
            .unwrap_or(0);
        let host_limit_bytes = lookup(HOST_LIMIT_VAR)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        Self {
            cuda_device,
            force_host: FORCE_HOST_VARS.iter().any(|var| flag(var)),
            allow_host_fallback: flag(ALLOW_FALLBACK_VAR),
            host_limit_bytes,
            crate_name: None,
        }
    }

    fn crate_name(&self) -> &str {
        self.crate_name.as_deref().unwrap_or("rust-ai-devmem")
    }

    fn host_memory(&self) -> Arc<dyn DeviceMemory> {
        Arc::new(HostMemory::with_limit(self.host_limit_bytes))
    }
}

impl ValidatableConfig for DeviceConfig {
    fn validate(&self) -> Result<()> {
        if self.crate_name.as_deref() == Some("") {
            return Err(DevMemError::invalid_config("crate_name must not be empty"));
        }
        if self.host_limit_bytes > 0 && !self.force_host && !self.allow_host_fallback {
            return Err(DevMemError::invalid_config(
                "host_limit_bytes only applies to the host simulation; \
                 set force_host or allow_host_fallback",
            ));
        }
        Ok(())
    }
}

/// Open the backend described by `config`, preferring CUDA.
///
/// 1. `force_host` returns the host simulation with a warning.
/// 2. Otherwise CUDA device `cuda_device` is opened.
/// 3. If that fails, the host simulation is returned with a warning when
///    `allow_host_fallback` is set; otherwise the error is returned.
///
/// ## Arguments
///
/// * `config` - Device selection; see [`DeviceConfig::from_env`]
///
/// ## Why Fallback Is Opt-In
///
/// The host simulation only stores bytes; nothing can run kernels against it.
/// Landing on it silently would hide a broken driver install, so callers that
/// can tolerate it say so explicitly and get a one-time warning when it happens.
///
/// # Errors
///
/// - `InvalidConfig` if the configuration does not validate.
/// - `DeviceNotAvailable` if CUDA cannot be opened and fallback is not allowed.
pub fn open_device(config: &DeviceConfig) -> Result<Arc<dyn DeviceMemory>> {
    config.validate()?;
    let crate_name = config.crate_name();

    if config.force_host {
        tracing::warn!(
            target: "devmem::device",
            "{crate_name}: host-simulated device memory forced via configuration. \
             Addresses cannot be passed to kernels."
        );
        return Ok(config.host_memory());
    }

    match open_cuda(config.cuda_device) {
        Ok(memory) => {
            tracing::info!(
                target: "devmem::device",
                "{crate_name}: using CUDA device {} for device buffers",
                config.cuda_device
            );
            Ok(memory)
        }
        Err(err) if config.allow_host_fallback => {
            tracing::debug!(target: "devmem::device", error = %err, "CUDA unavailable");
            let memory = config.host_memory();
            warn_if_simulated(memory.as_ref(), crate_name);
            Ok(memory)
        }
        Err(err) => Err(err),
    }
}

#[cfg(feature = "cuda")]
fn open_cuda(ordinal: usize) -> Result<Arc<dyn DeviceMemory>> {
    Ok(Arc::new(crate::backend::CudaMemory::new(ordinal)?))
}

#[cfg(not(feature = "cuda"))]
fn open_cuda(ordinal: usize) -> Result<Arc<dyn DeviceMemory>> {
    Err(DevMemError::device_not_available(format!(
        "CUDA:{ordinal} (built without the `cuda` feature)"
    )))
}

/// Emit a one-time warning if `memory` is a host simulation.
///
/// Call on entry to code that hands buffer addresses to kernels.
pub fn warn_if_simulated(memory: &dyn DeviceMemory, crate_name: &str) {
    static WARN_ONCE: Once = Once::new();

    if memory.is_simulated() {
        WARN_ONCE.call_once(|| {
            tracing::warn!(
                target: "devmem::device",
                "{crate_name}: host-simulated device memory in use. CUDA is the \
                 intended backend; simulated addresses cannot be passed to kernels."
            );
        });
    }
}
