//! `ThreadLocal`: one shared handle, one private value per thread.

use super::dealloc::Deallocator;
use super::slot::{self, Slot};
use crate::key::{self, Key, KeyError, LazyKey};
use core::ffi::c_void;
use core::fmt;
use core::ptr;

/// A per-thread storage cell.
///
/// Every thread that touches a `ThreadLocal` sees its own value, stored under an
/// OS thread-specific key. When a value is replaced, cleared, or abandoned by
/// an exiting thread, the cell's [`Deallocator`] receives it exactly once.
///
/// The cell itself holds no per-thread state, only the key and the deallocator,
/// so it can be shared freely, including as a `static`:
///
/// ```rust
/// use thread_slot::{Deallocator, ThreadLocal};
///
/// static DEPTH: ThreadLocal<u32> = ThreadLocal::lazy(Deallocator::ambient());
///
/// assert_eq!(DEPTH.get_or_init(|| 0), 0);
/// DEPTH.set(Some(3));
/// std::thread::spawn(|| assert_eq!(DEPTH.get(), None)).join().unwrap();
/// assert_eq!(DEPTH.get(), Some(3));
/// ```
///
/// `get` and `get_or_init` hand out copies and need `T: Clone`. Resources that
/// cannot or should not be copied are reached in place through
/// [`with`](Self::with), [`with_mut`](Self::with_mut) and
/// [`with_or_init`](Self::with_or_init):
///
/// ```rust
/// use thread_slot::{Deallocator, ThreadLocal};
///
/// struct Encoder {
///     scratch: Vec<u8>,
/// }
///
/// static ENCODER: ThreadLocal<Encoder> = ThreadLocal::lazy(Deallocator::ambient());
///
/// let len = ENCODER.with_or_init(
///     || Encoder { scratch: Vec::with_capacity(4096) },
///     |enc| enc.scratch.capacity(),
/// );
/// assert!(len >= 4096);
/// ENCODER.with_mut(|enc| enc.unwrap().scratch.extend_from_slice(b"abc"));
/// assert_eq!(ENCODER.with(|enc| enc.map(|e| e.scratch.len())), Some(3));
/// ```
///
/// # Re-entrancy
///
/// Deallocators run after the displaced value has left its box, so they may
/// read, replace or clear the cell they belong to. Writing to or clearing a
/// cell from inside one of its own `with` closures panics instead.
///
/// # Key limits
///
/// Each cell occupies one OS key for as long as it lives. On Windows the FLS
/// index is not returned when the cell is dropped, because freeing it would run
/// other threads' deallocators on the dropping thread. A process can therefore
/// create only about 4000 cells over its lifetime there. Prefer `static` cells,
/// or a handful of long-lived ones, over per-object cells.
pub struct ThreadLocal<T: 'static> {
    key: LazyKey,
    dealloc: Deallocator<T>,
}

impl<T: 'static> ThreadLocal<T> {
    /// Creates a cell and allocates its key immediately.
    ///
    /// # Errors
    /// Returns `KeyError` if the platform has no thread-specific keys left. On
    /// Windows every cell ever dropped still counts against that limit.
    pub fn new(dealloc: Deallocator<T>) -> Result<Self, KeyError> {
        let cell = Self::lazy(dealloc);
        cell.key.force()?;
        Ok(cell)
    }

    /// Creates a cell whose key is allocated on first use.
    ///
    /// Concurrent first uses from several threads agree on a single key.
    ///
    /// # Panics
    /// The first operation that needs the key panics if it cannot be
    /// allocated. Call [`try_init_key`](Self::try_init_key) to handle that case
    /// instead.
    pub const fn lazy(dealloc: Deallocator<T>) -> Self {
        Self {
            key: LazyKey::new(slot::destroy::<T>),
            dealloc,
        }
    }

    /// Allocates the key now if it has not been allocated yet.
    ///
    /// # Errors
    /// Returns `KeyError` if the platform has no thread-specific keys left.
    pub fn try_init_key(&self) -> Result<(), KeyError> {
        self.key.force().map(drop)
    }

    /// Returns the cell's deallocator.
    #[inline]
    pub fn deallocator(&self) -> Deallocator<T> {
        self.dealloc
    }

    /// Returns the calling thread's value, storing `default()` first if the
    /// thread has none.
    ///
    /// `default` runs only when the slot is empty, and at most once per call.
    pub fn get_or_init<F>(&self, default: F) -> T
    where
        F: FnOnce() -> T,
        T: Clone,
    {
        if let Some(value) = self.get() {
            return value;
        }
        let value = default();
        self.set(Some(value.clone()));
        value
    }

    /// Returns a copy of the calling thread's value, if it has one.
    ///
    /// This never stores anything and never allocates the key.
    #[inline]
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.with(|value| value.cloned())
    }

    /// Runs `f` with a reference to the calling thread's value, or `None`.
    ///
    /// Never stores anything and never allocates the key.
    ///
    /// # Panics
    /// Panics if `f` writes to or clears this cell, or if the value is already
    /// mutably borrowed through [`with_mut`](Self::with_mut).
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&T>) -> R,
    {
        let ptr = self.current();
        if ptr.is_null() {
            return f(None);
        }
        // SAFETY: non-null pointers under our key are live boxes of this
        // thread, and only this thread can reclaim them. A clear from inside
        // `f` fails its borrow check before the box is freed.
        unsafe { Slot::<T>::from_opaque(ptr) }.with(f)
    }

    /// Runs `f` with a mutable reference to the calling thread's value, or
    /// `None`.
    ///
    /// # Panics
    /// Panics if `f` touches this cell in any way that borrows the value.
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(Option<&mut T>) -> R,
    {
        let ptr = self.current();
        if ptr.is_null() {
            return f(None);
        }
        // SAFETY: see `with`.
        unsafe { Slot::<T>::from_opaque(ptr) }.with_mut(f)
    }

    /// Runs `f` with a reference to the calling thread's value, storing
    /// `default()` first if the thread has none.
    ///
    /// # Panics
    /// Panics if the deallocator clears the cell while `default()` is being
    /// stored, or in any case where [`with`](Self::with) panics.
    pub fn with_or_init<D, F, R>(&self, default: D, f: F) -> R
    where
        D: FnOnce() -> T,
        F: FnOnce(&T) -> R,
    {
        self.init_with(default);
        self.with(|value| f(initialized(value)))
    }

    /// Replaces or clears the calling thread's value.
    ///
    /// A displaced value is passed to the deallocator after the new state is
    /// in place. `set(None)` on a thread with no value does nothing.
    pub fn set(&self, value: Option<T>) {
        let key = match (&value, self.key.get_if_init()) {
            (_, Some(key)) => key,
            (Some(_), None) => self.force_key(),
            (None, None) => return,
        };

        // SAFETY: `key` belongs to `self.key`, which outlives this call.
        let ptr = unsafe { key::get(key) };
        let old = match value {
            Some(value) if ptr.is_null() => {
                self.install(key, value);
                None
            }
            Some(value) => {
                // SAFETY: see `with`. The borrow ends with this statement, so a
                // deallocator that clears the cell never frees a box in use.
                unsafe { Slot::<T>::from_opaque(ptr) }.swap(value)
            }
            None if ptr.is_null() => None,
            None => {
                // SAFETY: see `with`.
                unsafe { Slot::<T>::from_opaque(ptr) }.assert_unborrowed();
                // SAFETY: the pointer leaves the registry before it is freed, so
                // the exit destructor can no longer reach it.
                unsafe {
                    key::clear(key);
                    Slot::<T>::reclaim(ptr).into_value()
                }
            }
        };
        if let Some(old) = old {
            self.dealloc.dispose(old);
        }
    }

    /// Clears the calling thread's value. Same as `set(None)`.
    #[inline]
    pub fn clear(&self) {
        self.set(None);
    }

    /// Returns `true` if the calling thread currently holds a value.
    #[inline]
    pub fn is_set(&self) -> bool {
        !self.current().is_null()
    }

    /// Stores `default()` if the calling thread holds no value.
    pub(super) fn init_with<D>(&self, default: D)
    where
        D: FnOnce() -> T,
    {
        if !self.is_set() {
            self.set(Some(default()));
        }
    }

    #[inline]
    fn current(&self) -> *mut c_void {
        match self.key.get_if_init() {
            // SAFETY: `key` belongs to `self.key`.
            Some(key) => unsafe { key::get(key) },
            None => ptr::null_mut(),
        }
    }

    fn force_key(&self) -> Key {
        match self.key.force() {
            Ok(key) => key,
            Err(err) => panic!("cannot allocate a thread-local key: {err}"),
        }
    }

    fn install(&self, key: Key, value: T) {
        let ptr = Box::new(Slot::new(value, key, self.dealloc)).into_opaque();
        // SAFETY: `key` belongs to `self.key`.
        if let Err(err) = unsafe { key::set(key, ptr) } {
            // SAFETY: the registry rejected the pointer, so we still own it.
            drop(unsafe { Slot::<T>::reclaim(ptr) });
            panic!("cannot store a thread-local value: {err}");
        }
    }
}

/// Unwraps a value that `init_with` just stored.
pub(super) fn initialized<V>(value: Option<V>) -> V {
    match value {
        Some(value) => value,
        None => panic!("thread-local value was cleared while being initialized"),
    }
}

impl<T: 'static> Default for ThreadLocal<T> {
    fn default() -> Self {
        Self::lazy(Deallocator::ambient())
    }
}

impl<T: 'static> Drop for ThreadLocal<T> {
    /// Disposes of the dropping thread's value. Values other threads still hold
    /// are leaked; the key they live under is released right after, except on
    /// Windows where the FLS index stays allocated.
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: 'static> fmt::Debug for ThreadLocal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocal")
            .field("key", &self.key)
            .field("deallocator", &self.dealloc)
            .field("is_set", &self.is_set())
            .finish()
    }
}
