#![cfg(windows)]

use super::KeyError;
use core::ffi::c_void;
use core::ptr;
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::System::Threading::{
    FlsAlloc, FlsFree, FlsGetValue, FlsSetValue, FLS_OUT_OF_INDEXES,
};

pub(crate) type Key = u32;

/// Callback signature expected by `FlsAlloc`.
pub(crate) type Dtor = unsafe extern "system" fn(*const c_void);

pub(crate) unsafe fn create(dtor: Dtor) -> Result<Key, KeyError> {
    let key = FlsAlloc(Some(dtor));
    if key == FLS_OUT_OF_INDEXES {
        Err(KeyError::Exhausted)
    } else {
        Ok(key)
    }
}

#[inline]
pub(crate) unsafe fn get(key: Key) -> *mut c_void {
    FlsGetValue(key)
}

#[inline]
pub(crate) unsafe fn set(key: Key, value: *mut c_void) -> Result<(), KeyError> {
    if FlsSetValue(key, value) == 0 {
        Err(KeyError::Os(GetLastError() as i32))
    } else {
        Ok(())
    }
}

#[inline]
pub(crate) unsafe fn clear(key: Key) {
    let r = FlsSetValue(key, ptr::null());
    debug_assert!(r != 0);
}

/// Frees an index that never held values.
pub(crate) unsafe fn destroy(key: Key) {
    let r = FlsFree(key);
    debug_assert!(r != 0);
}

/// Leaves the index allocated.
///
/// `FlsFree` runs the callback for every thread's value on the calling
/// thread, which would hand values to a thread that does not own them.
pub(crate) unsafe fn release(_key: Key) {}
