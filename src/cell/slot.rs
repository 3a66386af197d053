//! The per-thread box behind a [`ThreadLocal`](crate::ThreadLocal).
//!
//! A `Slot` is heap-allocated on a thread's first store and surrendered to the
//! OS key as an opaque pointer. From then on exactly one of two paths takes it
//! back: an explicit clear on the owning thread, or the key's destructor when
//! that thread exits. Both paths null the key's pointer before reclaiming, so
//! neither can see a box the other already freed.
//!
//! No deallocator ever runs while a reference into a box is live. Values leave
//! the box first, and only then are they disposed of, which leaves deallocators
//! free to write to or clear the very cell they belong to.

use super::dealloc::Deallocator;
use crate::key::{self, Key};
use core::cell::RefCell;
use core::ffi::c_void;

pub(crate) struct Slot<T> {
    // `RefCell` turns a re-entrant write during a borrow into a panic.
    value: RefCell<Option<T>>,
    key: Key,
    dealloc: Deallocator<T>,
}

impl<T> Slot<T> {
    #[inline]
    pub(crate) fn new(value: T, key: Key, dealloc: Deallocator<T>) -> Self {
        Self {
            value: RefCell::new(Some(value)),
            key,
            dealloc,
        }
    }

    /// Installs `value` and hands back the previous one.
    ///
    /// Disposing of the returned value is the caller's job, once it no longer
    /// holds a reference to this slot.
    #[inline]
    pub(crate) fn swap(&self, value: T) -> Option<T> {
        self.value.replace(Some(value))
    }

    #[inline]
    pub(crate) fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&T>) -> R,
    {
        f(self.value.borrow().as_ref())
    }

    #[inline]
    pub(crate) fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&mut T>) -> R,
    {
        f(self.value.borrow_mut().as_mut())
    }

    /// Panics if the value is currently borrowed.
    ///
    /// Must hold before the slot is freed from under a shared reference.
    #[inline]
    pub(crate) fn assert_unborrowed(&self) {
        drop(self.value.borrow_mut());
    }

    /// Frees the box and returns the value it held, without disposing of it.
    pub(crate) fn into_value(mut self: Box<Self>) -> Option<T> {
        self.value.get_mut().take()
    }

    /// Hands ownership of the box to the caller as an opaque pointer.
    #[inline]
    pub(crate) fn into_opaque(self: Box<Self>) -> *mut c_void {
        Box::into_raw(self).cast()
    }

    /// Borrows the box behind `ptr` without taking ownership.
    ///
    /// # Safety
    /// `ptr` must come from [`Slot::into_opaque`] for this `T` and must not be
    /// reclaimed while the returned reference is alive.
    #[inline]
    pub(crate) unsafe fn from_opaque<'a>(ptr: *mut c_void) -> &'a Self {
        &*ptr.cast::<Self>()
    }

    /// Takes ownership of the box behind `ptr` back.
    ///
    /// # Safety
    /// `ptr` must come from [`Slot::into_opaque`] for this `T`, and must not be
    /// reclaimed twice.
    #[inline]
    pub(crate) unsafe fn reclaim(ptr: *mut c_void) -> Box<Self> {
        Box::from_raw(ptr.cast::<Self>())
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.get_mut().take() {
            self.dealloc.dispose(value);
        }
    }
}

/// Key destructor: reclaims the exiting thread's box.
#[cfg(unix)]
pub(crate) unsafe extern "C" fn destroy<T>(ptr: *mut c_void) {
    reclaim_on_exit::<T>(ptr);
}

/// Key destructor: reclaims the exiting thread's box.
#[cfg(windows)]
pub(crate) unsafe extern "system" fn destroy<T>(ptr: *const c_void) {
    reclaim_on_exit::<T>(ptr.cast_mut());
}

unsafe fn reclaim_on_exit<T>(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    tls_log!(trace, "reclaiming thread-local slot at {:p} on thread exit", ptr);
    let slot = Slot::<T>::reclaim(ptr);
    // pthreads has already nulled the pointer by now; FLS makes no such promise.
    key::clear(slot.key);
    let dealloc = slot.dealloc;
    if let Some(value) = slot.into_value() {
        dealloc.dispose(value);
    }
}
