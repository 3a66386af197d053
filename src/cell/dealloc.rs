//! Deallocation policies for values displaced from a [`ThreadLocal`](crate::ThreadLocal).
//!
//! A value leaves its slot in one of three ways: it is replaced by `set`, it is
//! cleared by `set(None)`, or its thread exits while still holding it. In every
//! case the cell hands the value to its [`Deallocator`] exactly once.

use core::ffi::c_void;
use core::fmt;
use core::ptr::NonNull;

mod sealed {
    pub trait Sealed {}
}

/// Pointer-shaped values whose pointee can be released with `free`.
///
/// This trait is sealed. It is implemented for `*mut U`, `*const U` and
/// `NonNull<U>`, which is what makes [`Deallocator::free`] unavailable for any
/// other value type.
pub trait RawPointer: Copy + sealed::Sealed {
    /// Returns the pointer's address, untyped.
    fn into_raw(self) -> *mut c_void;
}

impl<U> sealed::Sealed for *mut U {}
impl<U> sealed::Sealed for *const U {}
impl<U> sealed::Sealed for NonNull<U> {}

impl<U> RawPointer for *mut U {
    #[inline]
    fn into_raw(self) -> *mut c_void {
        self.cast()
    }
}

impl<U> RawPointer for *const U {
    #[inline]
    fn into_raw(self) -> *mut c_void {
        self.cast_mut().cast()
    }
}

impl<U> RawPointer for NonNull<U> {
    #[inline]
    fn into_raw(self) -> *mut c_void {
        self.as_ptr().cast()
    }
}

/// Which policy a [`Deallocator`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeallocatorKind {
    /// The value is dropped normally.
    Ambient,
    /// A caller-supplied function receives the value.
    Custom,
    /// The pointee's allocation is released with `free`.
    Free,
}

enum Policy<T> {
    Ambient,
    Custom(fn(T)),
    Free(fn(T)),
}

/// Decides what happens to a value that leaves its thread-local slot.
///
/// All three constructors are `const`, so a deallocator can be part of a
/// `static` cell declaration.
///
/// # Example
///
/// ```rust
/// use thread_slot::{Deallocator, DeallocatorKind};
///
/// fn close(fd: i32) {
///     let _ = fd;
/// }
///
/// let d: Deallocator<i32> = Deallocator::custom(close);
/// assert_eq!(d.kind(), DeallocatorKind::Custom);
///
/// let d: Deallocator<*mut u8> = unsafe { Deallocator::free() };
/// assert_eq!(d.kind(), DeallocatorKind::Free);
/// ```
///
/// `free` is only defined for pointer-shaped values:
///
/// ```compile_fail
/// use thread_slot::Deallocator;
///
/// let d: Deallocator<u64> = unsafe { Deallocator::free() };
/// ```
pub struct Deallocator<T> {
    policy: Policy<T>,
}

impl<T> Deallocator<T> {
    /// Drops displaced values the ordinary way.
    ///
    /// This is the right choice for any type whose `Drop` already releases its
    /// resources.
    #[inline]
    pub const fn ambient() -> Self {
        Self {
            policy: Policy::Ambient,
        }
    }

    /// Passes each displaced value to `f`.
    #[inline]
    pub const fn custom(f: fn(T)) -> Self {
        Self {
            policy: Policy::Custom(f),
        }
    }

    /// Returns the policy this deallocator applies.
    #[inline]
    pub const fn kind(&self) -> DeallocatorKind {
        match self.policy {
            Policy::Ambient => DeallocatorKind::Ambient,
            Policy::Custom(_) => DeallocatorKind::Custom,
            Policy::Free(_) => DeallocatorKind::Free,
        }
    }

    #[inline]
    pub(crate) fn dispose(&self, value: T) {
        match self.policy {
            Policy::Ambient => drop(value),
            Policy::Custom(f) | Policy::Free(f) => f(value),
        }
    }
}

impl<T: RawPointer> Deallocator<T> {
    /// Releases each displaced pointer with `libc::free`.
    ///
    /// Null pointers are passed through to `free`, which ignores them.
    ///
    /// # Safety
    /// Every non-null pointer stored in a cell using this deallocator must come
    /// from `malloc` (or a compatible allocator) and must not be freed by anyone
    /// else.
    #[inline]
    pub const unsafe fn free() -> Self {
        Self {
            policy: Policy::Free(free_raw::<T>),
        }
    }
}

fn free_raw<T: RawPointer>(ptr: T) {
    // SAFETY: guaranteed by the caller of `Deallocator::free`.
    unsafe { libc::free(ptr.into_raw()) }
}

impl<T> Clone for Deallocator<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Deallocator<T> {}

impl<T> Clone for Policy<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Policy<T> {}

impl<T> Default for Deallocator<T> {
    fn default() -> Self {
        Self::ambient()
    }
}

impl<T> fmt::Debug for Deallocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Deallocator").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    thread_local! {
        static SEEN: Cell<i64> = const { Cell::new(0) };
    }

    fn record(v: i64) {
        SEEN.with(|s| s.set(s.get() + v));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Deallocator::<String>::ambient().kind(), DeallocatorKind::Ambient);
        assert_eq!(Deallocator::<String>::default().kind(), DeallocatorKind::Ambient);
        assert_eq!(Deallocator::custom(record).kind(), DeallocatorKind::Custom);
        let free = unsafe { Deallocator::<NonNull<u8>>::free() };
        assert_eq!(free.kind(), DeallocatorKind::Free);
    }

    #[test]
    fn test_custom_receives_value() {
        let d = Deallocator::custom(record);
        d.dispose(5);
        d.dispose(-2);
        assert_eq!(SEEN.with(Cell::get), 3);
    }

    #[test]
    fn test_ambient_drops() {
        let rc = Rc::new(());
        let d = Deallocator::ambient();
        d.dispose(Rc::clone(&rc));
        assert_eq!(Rc::strong_count(&rc), 1);
    }

    #[test]
    fn test_free_releases_malloc() {
        let d = unsafe { Deallocator::<*mut u64>::free() };
        let p = unsafe { libc::malloc(core::mem::size_of::<u64>()) }.cast::<u64>();
        assert!(!p.is_null());
        d.dispose(p);
        d.dispose(core::ptr::null_mut());
    }

    #[test]
    fn test_raw_pointer_addresses() {
        let mut x = 3u32;
        let p: *mut u32 = &mut x;
        assert_eq!(p.into_raw() as usize, p as usize);
        assert_eq!((p as *const u32).into_raw() as usize, p as usize);
        assert_eq!(NonNull::new(p).unwrap().into_raw() as usize, p as usize);
    }

    #[test]
    fn test_debug() {
        assert_eq!(format!("{:?}", Deallocator::<u8>::ambient()), "Deallocator(Ambient)");
    }
}
