//! `LocalKey`: a cell bundled with its default initializer.

use super::thread_local::{initialized, ThreadLocal};
use core::fmt;

/// A [`ThreadLocal`] paired with the function that produces each thread's
/// first value.
///
/// This is what [`thread_slot!`](crate::thread_slot) declares for a static with
/// an initializer, but it can be built by hand as well:
///
/// ```rust
/// use thread_slot::{Deallocator, LocalKey, ThreadLocal};
///
/// fn fresh() -> Vec<u8> {
///     Vec::with_capacity(16)
/// }
///
/// static BUF: LocalKey<Vec<u8>> = LocalKey::new(ThreadLocal::lazy(Deallocator::ambient()), fresh);
///
/// BUF.with_mut(|buf| buf.push(1));
/// assert_eq!(BUF.with(|buf| buf.len()), 1);
/// assert_eq!(BUF.get(), vec![1]);
/// ```
pub struct LocalKey<T: 'static> {
    cell: ThreadLocal<T>,
    init: fn() -> T,
}

impl<T: 'static> LocalKey<T> {
    /// Pairs `cell` with the initializer `init`.
    pub const fn new(cell: ThreadLocal<T>, init: fn() -> T) -> Self {
        Self { cell, init }
    }

    /// Returns the calling thread's value, running the initializer if the
    /// thread has none yet.
    #[inline]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Runs `f` with a reference to the calling thread's value, running the
    /// initializer first if the thread has none yet.
    ///
    /// # Panics
    /// Panics if `f` writes to or clears this key.
    #[inline]
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        self.cell.with_or_init(self.init, f)
    }

    /// Runs `f` with a mutable reference to the calling thread's value,
    /// running the initializer first if the thread has none yet.
    ///
    /// # Panics
    /// Panics if `f` touches this key in any way that borrows the value.
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.cell.init_with(self.init);
        self.cell.with_mut(|value| f(initialized(value)))
    }

    /// Replaces the calling thread's value.
    #[inline]
    pub fn set(&self, value: T) {
        self.cell.set(Some(value));
    }

    /// Clears the calling thread's value; the next `get` runs the initializer
    /// again.
    #[inline]
    pub fn reset(&self) {
        self.cell.clear();
    }

    /// Returns the underlying cell.
    #[inline]
    pub fn cell(&self) -> &ThreadLocal<T> {
        &self.cell
    }
}

impl<T: 'static> fmt::Debug for LocalKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKey").field("cell", &self.cell).finish_non_exhaustive()
    }
}
