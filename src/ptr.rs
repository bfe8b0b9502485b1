// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Typed, nullable device addresses.

use std::fmt;
use std::marker::PhantomData;

/// A raw device address for elements of type `T`.
///
/// Address `0` is the null pointer. A `DevicePtr` carries no ownership: it is
/// `Copy`, and whoever allocated it decides when it is released. Ownership is
/// tracked by [`DeviceBuffer`](crate::DeviceBuffer), not by this type.
pub struct DevicePtr<T> {
    addr: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DevicePtr<T> {
    /// The null device pointer.
    #[must_use]
    pub const fn null() -> Self {
        Self::from_addr(0)
    }

    /// Wrap a raw device address (as returned by the driver).
    #[must_use]
    pub const fn from_addr(addr: u64) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    /// Raw device address.
    #[must_use]
    pub const fn addr(self) -> u64 {
        self.addr
    }

    /// Whether this is the null pointer.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.addr == 0
    }

    /// Pointer `count` elements further on, e.g. into a larger allocation.
    ///
    /// The null pointer stays null. Address arithmetic wraps around `u64`; use
    /// [`checked_add`](Self::checked_add) when the offset comes from untrusted
    /// sizes.
    #[must_use]
    pub fn add(self, count: usize) -> Self {
        if self.is_null() {
            return self;
        }
        let offset = (count as u64).wrapping_mul(std::mem::size_of::<T>() as u64);
        Self::from_addr(self.addr.wrapping_add(offset))
    }

    /// Like [`add`](Self::add), but `None` if the byte offset or the resulting
    /// address overflows `u64`.
    #[must_use]
    pub fn checked_add(self, count: usize) -> Option<Self> {
        if self.is_null() {
            return Some(self);
        }
        let offset = u64::try_from(count)
            .ok()?
            .checked_mul(std::mem::size_of::<T>() as u64)?;
        self.addr.checked_add(offset).map(Self::from_addr)
    }

    /// Reinterpret as a pointer to another element type.
    #[must_use]
    pub const fn cast<U>(self) -> DevicePtr<U> {
        DevicePtr::from_addr(self.addr)
    }

    /// Raw `*const T` for kernel launch arguments.
    #[must_use]
    pub fn as_ptr(self) -> *const T {
        self.addr as usize as *const T
    }

    /// Raw `*mut T` for kernel launch arguments.
    #[must_use]
    pub fn as_mut_ptr(self) -> *mut T {
        self.addr as usize as *mut T
    }
}

// Manual impls: derives would demand `T: Clone` etc.
impl<T> Clone for DevicePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DevicePtr<T> {}

impl<T> PartialEq for DevicePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for DevicePtr<T> {}

impl<T> std::hash::Hash for DevicePtr<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl<T> Default for DevicePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for DevicePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePtr(0x{:x})", self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_pointer() {
        let p: DevicePtr<f32> = DevicePtr::null();
        assert!(p.is_null());
        assert_eq!(p, DevicePtr::default());
        assert!(p.add(16).is_null());
    }

    #[test]
    fn test_add_advances_by_element_size() {
        let p: DevicePtr<f64> = DevicePtr::from_addr(0x1000);
        assert_eq!(p.add(2).addr(), 0x1010);
        assert_eq!(p.cast::<u8>().add(2).addr(), 0x1002);
    }

    #[test]
    fn test_add_overflow() {
        let p: DevicePtr<u32> = DevicePtr::from_addr(u64::MAX - 7);
        assert_eq!(p.checked_add(1).map(DevicePtr::addr), Some(u64::MAX - 3));
        assert_eq!(p.checked_add(2), None);
        assert_eq!(p.checked_add(usize::MAX), None);
        assert_eq!(p.add(3).addr(), 4);
        assert!(DevicePtr::<u32>::null().checked_add(usize::MAX).unwrap().is_null());
    }

    #[test]
    fn test_debug_is_hex() {
        let p: DevicePtr<u32> = DevicePtr::from_addr(0xdead_0000);
        assert_eq!(format!("{p:?}"), "DevicePtr(0xdead0000)");
    }
}
