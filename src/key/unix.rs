#![cfg(unix)]

use super::KeyError;
use core::ffi::c_void;
use core::ptr;

pub(crate) type Key = libc::pthread_key_t;

/// Destructor signature expected by `pthread_key_create`.
pub(crate) type Dtor = unsafe extern "C" fn(*mut c_void);

impl KeyError {
    fn from_code(code: libc::c_int) -> Self {
        match code {
            libc::EAGAIN => KeyError::Exhausted,
            libc::ENOMEM => KeyError::OutOfMemory,
            code => KeyError::Os(code),
        }
    }
}

pub(crate) unsafe fn create(dtor: Dtor) -> Result<Key, KeyError> {
    let mut key: Key = 0;
    match libc::pthread_key_create(&mut key, Some(dtor)) {
        0 => Ok(key),
        code => Err(KeyError::from_code(code)),
    }
}

#[inline]
pub(crate) unsafe fn get(key: Key) -> *mut c_void {
    libc::pthread_getspecific(key)
}

#[inline]
pub(crate) unsafe fn set(key: Key, value: *mut c_void) -> Result<(), KeyError> {
    match libc::pthread_setspecific(key, value) {
        0 => Ok(()),
        code => Err(KeyError::from_code(code)),
    }
}

#[inline]
pub(crate) unsafe fn clear(key: Key) {
    // Storing null never needs a new allocation.
    let r = libc::pthread_setspecific(key, ptr::null());
    debug_assert_eq!(r, 0);
}

/// Deletes a key that never held values.
pub(crate) unsafe fn destroy(key: Key) {
    let r = libc::pthread_key_delete(key);
    debug_assert_eq!(r, 0);
}

/// Deletes a key that may still hold values on other threads.
///
/// `pthread_key_delete` runs no destructors, so those values are leaked. A key
/// created later starts out null on every thread.
pub(crate) unsafe fn release(key: Key) {
    destroy(key);
}
