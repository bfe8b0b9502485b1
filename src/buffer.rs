// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Owned-or-borrowed device buffer handle.
//!
//! [`DeviceBuffer`] hides whether the buffer behind it was allocated by the
//! handle or supplied from outside. [`DeviceBuffer::get`] always returns the
//! current buffer; the handle frees what it allocated exactly once and never
//! frees what it borrowed.
//!
//! ## States
//!
//! ```text
//!                 ensure_capacity(n)
//!   Unallocated ─────────────────────▶ Owned(ptr, cap)
//!        │  ▲                            │  ▲   │ ensure_capacity(n > cap):
//!        │  │ unset_external             │  │   │ release, then allocate n
//!        │  │ (no shadow)                │  │   ▼
//!        │  │          set_external(p)   │  │ unset_external
//!        ▼  │       ┌────────────────────┘  │ (shadow resumes)
//!   Borrowed(p, shadowed: Option<Owned>) ◀──┘
//! ```
//!
//! While borrowed, an earlier owned allocation is kept but hidden: it is neither
//! returned by `get` nor freed, and comes back on `unset_external`.
//!
//! ## Growth Policy
//!
//! Capacity only grows. A request that fits the current owned allocation is a
//! no-op even if the buffer is much larger than needed. A request that does
//! not fit releases the old buffer first and then allocates exactly the
//! requested size, so a failed allocation leaves the handle empty rather than
//! holding two buffers.

use crate::error::{DevMemError, DeviceOp, Result};
use crate::ops;
use crate::ptr::DevicePtr;
use crate::traits::DeviceMemory;
use bytemuck::Pod;
use std::fmt;
use std::sync::Arc;

/// Which kind of buffer a handle currently exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// No buffer; `get` returns null.
    Unallocated,
    /// A buffer this handle allocated and will free.
    Owned,
    /// A buffer supplied from outside; never freed by this handle.
    Borrowed,
}

struct Allocation<T> {
    ptr: DevicePtr<T>,
    /// Elements, not bytes.
    capacity: usize,
}

enum BufferState<T> {
    Unallocated,
    Owned(Allocation<T>),
    Borrowed {
        ptr: DevicePtr<T>,
        shadowed: Option<Allocation<T>>,
    },
}

/// A device buffer that is either owned (lazily grown) or borrowed.
///
/// The handle is neither `Clone` nor `Copy`: two handles must never believe
/// they own the same allocation. Moving it moves the release obligation with
/// it; [`take`](Self::take) moves the contents out and leaves an empty handle.
///
/// ```rust
/// use std::sync::Arc;
/// use rust_ai_devmem::{backend::HostMemory, DeviceBuffer};
///
/// let mem = Arc::new(HostMemory::new());
/// let mut buf = DeviceBuffer::<f32, _>::new(Arc::clone(&mem));
///
/// buf.ensure_capacity(10)?;
/// let first = buf.get();
/// buf.ensure_capacity(5)?; // fits, nothing happens
/// assert_eq!(buf.get(), first);
/// assert_eq!(buf.capacity(), 10);
///
/// drop(buf);
/// assert_eq!(mem.stats().frees, 1);
/// # Ok::<(), rust_ai_devmem::DevMemError>(())
/// ```
pub struct DeviceBuffer<T: Pod, M: DeviceMemory + ?Sized = dyn DeviceMemory> {
    state: BufferState<T>,
    memory: Arc<M>,
}

impl<T: Pod, M: DeviceMemory + ?Sized> DeviceBuffer<T, M> {
    /// Create an empty handle. Nothing is allocated.
    #[must_use]
    pub fn new(memory: Arc<M>) -> Self {
        Self {
            state: BufferState::Unallocated,
            memory,
        }
    }

    /// Create a handle owning a buffer of `count` elements.
    ///
    /// # Errors
    ///
    /// Returns a device error if the allocation fails.
    pub fn with_capacity(memory: Arc<M>, count: usize) -> Result<Self> {
        let mut buf = Self::new(memory);
        buf.ensure_capacity(count)?;
        Ok(buf)
    }

    /// Backend this handle allocates from.
    #[must_use]
    pub fn memory(&self) -> &Arc<M> {
        &self.memory
    }

    /// Borrow `ptr` as the current buffer.
    ///
    /// A null `ptr` is the same as [`unset_external`](Self::unset_external).
    /// Any owned allocation is kept (shadowed), not freed.
    pub fn set_external(&mut self, ptr: DevicePtr<T>) {
        if ptr.is_null() {
            self.unset_external();
            return;
        }
        let shadowed = match std::mem::replace(&mut self.state, BufferState::Unallocated) {
            BufferState::Unallocated => None,
            BufferState::Owned(alloc) => Some(alloc),
            BufferState::Borrowed { shadowed, .. } => shadowed,
        };
        tracing::trace!(
            target: "devmem::buffer",
            ptr = ?ptr,
            shadowing = shadowed.is_some(),
            "borrowing external device buffer"
        );
        self.state = BufferState::Borrowed { ptr, shadowed };
    }

    /// Pointer-assignment form of [`set_external`](Self::set_external).
    pub fn assign(&mut self, ptr: DevicePtr<T>) -> &mut Self {
        self.set_external(ptr);
        self
    }

    /// Stop borrowing. `get` falls back to the owned allocation, if any.
    pub fn unset_external(&mut self) {
        if !self.is_external() {
            return;
        }
        if let BufferState::Borrowed { shadowed, .. } =
            std::mem::replace(&mut self.state, BufferState::Unallocated)
        {
            self.state = shadowed.map_or(BufferState::Unallocated, BufferState::Owned);
        }
    }

    /// Whether a borrowed pointer is active.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self.state, BufferState::Borrowed { .. })
    }

    /// Make sure the owned buffer holds at least `count` elements.
    ///
    /// - Borrowing: no-op, whatever `count` is.
    /// - Owned with capacity ≥ `count`: no-op.
    /// - Owned with capacity < `count`: release, then allocate exactly `count`.
    /// - Unallocated: allocate exactly `count`.
    ///
    /// ## Arguments
    ///
    /// * `count` - Required capacity in elements of `T`
    ///
    /// ## Why Release Before Allocate
    ///
    /// Growth never copies old contents, so there is nothing to keep. Freeing
    /// first means the old and new buffers never coexist on the device, which
    /// is what lets a large buffer grow on a nearly full card.
    ///
    /// # Errors
    ///
    /// Returns the device error of a failed allocation. In the growth case the
    /// old buffer is already gone and the handle is left unallocated.
    pub fn ensure_capacity(&mut self, count: usize) -> Result<()> {
        match &self.state {
            BufferState::Borrowed { .. } => return Ok(()),
            BufferState::Owned(alloc) if alloc.capacity >= count => return Ok(()),
            _ => {}
        }

        if let BufferState::Owned(old) =
            std::mem::replace(&mut self.state, BufferState::Unallocated)
        {
            tracing::debug!(
                target: "devmem::buffer",
                backend = self.memory.name(),
                old_capacity = old.capacity,
                new_capacity = count,
                "growing device buffer"
            );
            // SAFETY: `old` was allocated by this handle and is no longer
            // reachable from it.
            unsafe { ops::release(&*self.memory, old.ptr) };
        }

        let ptr = ops::allocate::<T, M>(&*self.memory, count)?;
        if !ptr.is_null() {
            tracing::debug!(
                target: "devmem::buffer",
                backend = self.memory.name(),
                capacity = count,
                ptr = ?ptr,
                "allocated device buffer"
            );
            self.state = BufferState::Owned(Allocation {
                ptr,
                capacity: count,
            });
        }
        Ok(())
    }

    /// Elements held by the owned allocation; `0` if there is none.
    ///
    /// Not affected by a borrowed pointer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match &self.state {
            BufferState::Owned(alloc)
            | BufferState::Borrowed {
                shadowed: Some(alloc),
                ..
            } => alloc.capacity,
            _ => 0,
        }
    }

    /// Bytes held by the owned allocation.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.capacity() * std::mem::size_of::<T>()
    }

    /// Whether [`get`](Self::get) would return a non-null pointer.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.get().is_null()
    }

    /// Current buffer: the borrowed pointer if set, else the owned one, else null.
    #[must_use]
    pub fn get(&self) -> DevicePtr<T> {
        match &self.state {
            BufferState::Unallocated => DevicePtr::null(),
            BufferState::Owned(alloc) => alloc.ptr,
            BufferState::Borrowed { ptr, .. } => *ptr,
        }
    }

    /// Which kind of buffer `get` currently returns.
    #[must_use]
    pub fn kind(&self) -> BufferKind {
        match self.state {
            BufferState::Unallocated => BufferKind::Unallocated,
            BufferState::Owned(_) => BufferKind::Owned,
            BufferState::Borrowed { .. } => BufferKind::Borrowed,
        }
    }

    /// Move the contents into a new handle, leaving this one unallocated.
    ///
    /// The returned handle takes over the release obligation; `self` owns
    /// nothing afterwards.
    #[must_use]
    pub fn take(&mut self) -> Self {
        Self {
            state: std::mem::replace(&mut self.state, BufferState::Unallocated),
            memory: Arc::clone(&self.memory),
        }
    }

    /// Copy `host` into the current buffer, growing the owned buffer if needed.
    ///
    /// While borrowing, nothing is allocated and the data goes to the borrowed
    /// pointer; the caller vouches for its size.
    ///
    /// # Errors
    ///
    /// Returns device errors from the allocation or the copy.
    pub fn upload(&mut self, host: &[T]) -> Result<()> {
        self.ensure_capacity(host.len())?;
        ops::copy_to_device(&*self.memory, self.get(), Some(host), host.len())
    }

    /// Copy `host.len()` elements out of the current buffer.
    ///
    /// A handle with no buffer leaves `host` untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`DeviceOp::CopyToHost`] device error if `host` is longer than
    /// the owned buffer, or whatever the runtime reports.
    pub fn download(&self, host: &mut [T]) -> Result<()> {
        if let BufferState::Owned(alloc) = &self.state {
            if host.len() > alloc.capacity {
                return Err(DevMemError::device(
                    DeviceOp::CopyToHost,
                    format!(
                        "{} elements requested from a buffer of {}",
                        host.len(),
                        alloc.capacity
                    ),
                ));
            }
        }
        let count = host.len();
        ops::copy_to_host(&*self.memory, Some(host), self.get(), count)
    }
}

impl<T: Pod, M: DeviceMemory + ?Sized> Drop for DeviceBuffer<T, M> {
    fn drop(&mut self) {
        let owned = match std::mem::replace(&mut self.state, BufferState::Unallocated) {
            BufferState::Owned(alloc)
            | BufferState::Borrowed {
                shadowed: Some(alloc),
                ..
            } => alloc,
            _ => return,
        };
        tracing::trace!(
            target: "devmem::buffer",
            backend = self.memory.name(),
            capacity = owned.capacity,
            ptr = ?owned.ptr,
            "releasing device buffer"
        );
        // SAFETY: the owned allocation came from this handle and dies with it.
        unsafe { ops::release(&*self.memory, owned.ptr) };
    }
}

impl<T: Pod, M: DeviceMemory + ?Sized> fmt::Debug for DeviceBuffer<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("kind", &self.kind())
            .field("ptr", &self.get())
            .field("capacity", &self.capacity())
            .field("backend", &self.memory.name())
            .finish()
    }
}
