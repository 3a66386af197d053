//! OS thread-specific keys.
//!
//! A key is a process-wide handle under which the platform stores one opaque
//! pointer per thread, and for which it invokes a destructor on each exiting
//! thread that left a non-null pointer behind. This is `pthread_key_create` on
//! Unix and `FlsAlloc` on Windows.
//!
//! The key layer never interprets the pointers it stores: ownership of whatever
//! they point to is the caller's business.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as imp;
#[cfg(windows)]
use windows as imp;

pub(crate) use imp::{Dtor, Key};

use core::ffi::c_void;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

/// The error returned when the platform cannot allocate a thread-specific key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// The process-wide limit on keys has been reached.
    Exhausted,
    /// The platform could not allocate memory for the key.
    OutOfMemory,
    /// Any other platform error code.
    Os(i32),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::Exhausted => f.write_str("thread-specific keys exhausted"),
            KeyError::OutOfMemory => f.write_str("out of memory allocating a thread-specific key"),
            KeyError::Os(code) => write!(f, "thread-specific key operation failed (os error {code})"),
        }
    }
}

impl std::error::Error for KeyError {}

/// A key that is allocated on first use.
///
/// The allocated key is published through one atomic word holding `key + 1`,
/// so that zero can mean "not allocated yet" even on platforms where zero is a
/// valid key.
pub(crate) struct LazyKey {
    key: AtomicUsize,
    dtor: Dtor,
}

impl LazyKey {
    pub(crate) const fn new(dtor: Dtor) -> Self {
        Self {
            key: AtomicUsize::new(0),
            dtor,
        }
    }

    /// Returns the key if some thread has already allocated it.
    #[inline]
    pub(crate) fn get_if_init(&self) -> Option<Key> {
        match self.key.load(Ordering::Acquire) {
            0 => None,
            word => Some(decode(word)),
        }
    }

    /// Returns the key, allocating it if this is the first use.
    #[inline]
    pub(crate) fn force(&self) -> Result<Key, KeyError> {
        match self.get_if_init() {
            Some(key) => Ok(key),
            None => self.lazy_init(),
        }
    }

    #[cold]
    fn lazy_init(&self) -> Result<Key, KeyError> {
        // SAFETY: `dtor` is the destructor this key was declared with.
        let key = match unsafe { imp::create(self.dtor) } {
            Ok(key) => key,
            Err(err) => {
                tls_log!(warn, "thread-specific key allocation failed: {}", err);
                return Err(err);
            }
        };

        let word = encode(key);
        match self
            .key
            .compare_exchange(0, word, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tls_log!(debug, "allocated thread-specific key {:?}", key);
                Ok(key)
            }
            // Another thread published its key first. Ours was never handed
            // out, so no thread can hold a value under it.
            Err(winner) => {
                // SAFETY: `key` is unpublished and holds no values.
                unsafe { imp::destroy(key) };
                tls_log!(debug, "lost key allocation race, discarded key {:?}", key);
                Ok(decode(winner))
            }
        }
    }
}

#[inline]
fn encode(key: Key) -> usize {
    key as usize + 1
}

// The word was produced by `encode`, so it holds a `Key` plus one.
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn decode(word: usize) -> Key {
    debug_assert_ne!(word, 0);
    (word - 1) as Key
}

impl fmt::Debug for LazyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyKey")
            .field("key", &self.get_if_init())
            .finish()
    }
}

impl Drop for LazyKey {
    fn drop(&mut self) {
        if let Some(key) = self.get_if_init() {
            // SAFETY: `&mut self` means no operation on this key is in flight.
            unsafe { imp::release(key) };
            tls_log!(debug, "released thread-specific key {:?}", key);
        }
    }
}

/// Returns the calling thread's pointer for `key`, or null.
///
/// # Safety
/// `key` must come from a [`LazyKey`] that is still alive.
#[inline]
pub(crate) unsafe fn get(key: Key) -> *mut c_void {
    imp::get(key)
}

/// Stores `value` as the calling thread's pointer for `key`.
///
/// The previous pointer is overwritten without running any destructor.
///
/// # Safety
/// `key` must come from a [`LazyKey`] that is still alive.
#[inline]
pub(crate) unsafe fn set(key: Key, value: *mut c_void) -> Result<(), KeyError> {
    imp::set(key, value)
}

/// Resets the calling thread's pointer for `key` to null.
///
/// # Safety
/// `key` must come from a [`LazyKey`] that is still alive.
#[inline]
pub(crate) unsafe fn clear(key: Key) {
    imp::clear(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    #[cfg(unix)]
    unsafe extern "C" fn count(_: *mut c_void) {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
    }

    #[cfg(windows)]
    unsafe extern "system" fn count(ptr: *const c_void) {
        if !ptr.is_null() {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[cfg(unix)]
    unsafe extern "C" fn ignore(_: *mut c_void) {}

    #[cfg(windows)]
    unsafe extern "system" fn ignore(_: *const c_void) {}

    fn assert_sync<T: Sync>() {}
    fn assert_send<T: Send>() {}

    #[test]
    fn test_key_is_lazy() {
        assert_sync::<LazyKey>();
        assert_send::<LazyKey>();

        let key = LazyKey::new(ignore);
        assert_eq!(key.get_if_init(), None);
        let k = key.force().unwrap();
        assert_eq!(key.get_if_init(), Some(k));
        assert_eq!(key.force().unwrap(), k);
    }

    #[test]
    fn test_get_set_clear() {
        let k1 = LazyKey::new(ignore);
        let k2 = LazyKey::new(ignore);
        let a = k1.force().unwrap();
        let b = k2.force().unwrap();
        assert_ne!(a, b);

        unsafe {
            assert!(get(a).is_null());
            assert!(get(b).is_null());
            set(a, 1 as *mut c_void).unwrap();
            set(b, 2 as *mut c_void).unwrap();
            assert_eq!(get(a) as usize, 1);
            assert_eq!(get(b) as usize, 2);
            clear(a);
            clear(b);
            assert!(get(a).is_null());
        }
    }

    #[test]
    fn test_values_are_per_thread() {
        let key = Arc::new(LazyKey::new(ignore));
        let k = key.force().unwrap();
        unsafe { set(k, 7 as *mut c_void).unwrap() };

        let other = Arc::clone(&key);
        thread::spawn(move || {
            let k = other.force().unwrap();
            unsafe {
                assert!(get(k).is_null());
                set(k, 9 as *mut c_void).unwrap();
                assert_eq!(get(k) as usize, 9);
                clear(k);
            }
        })
        .join()
        .unwrap();

        assert_eq!(unsafe { get(k) } as usize, 7);
        unsafe { clear(k) };
    }

    #[test]
    fn test_concurrent_first_use_agrees() {
        let key = Arc::new(LazyKey::new(ignore));
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let key = Arc::clone(&key);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    key.force().unwrap()
                })
            })
            .collect();

        let keys: Vec<Key> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(keys.iter().all(|k| *k == keys[0]));
        assert_eq!(key.get_if_init(), Some(keys[0]));
    }

    #[test]
    fn test_destructor_runs_for_non_null_only() {
        let key = Arc::new(LazyKey::new(count));
        key.force().unwrap();

        let with_value = Arc::clone(&key);
        thread::spawn(move || {
            let k = with_value.force().unwrap();
            unsafe { set(k, 1 as *mut c_void).unwrap() };
        })
        .join()
        .unwrap();

        let without_value = Arc::clone(&key);
        thread::spawn(move || {
            without_value.force().unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_key_word_round_trip() {
        for key in [0, 1, 127, 1023] {
            let word = encode(key);
            assert_ne!(word, 0);
            assert_eq!(decode(word), key);
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(KeyError::Exhausted.to_string(), "thread-specific keys exhausted");
        assert!(KeyError::Os(22).to_string().contains("os error 22"));
    }
}
