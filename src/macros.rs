// Forwards to `tracing` when the `tracing` feature is enabled. Without it the
// arguments are still type-checked, then discarded.
macro_rules! tls_log {
    ($level:ident, $($arg:tt)+) => {{
        #[cfg(feature = "tracing")]
        {
            ::tracing::$level!($($arg)+);
        }
        #[cfg(not(feature = "tracing"))]
        {
            let _ = format_args!($($arg)+);
        }
    }};
}

/// Declares one or more thread-local statics backed by [`ThreadLocal`](crate::ThreadLocal).
///
/// A declaration with an initializer becomes a [`LocalKey`](crate::LocalKey): its
/// `get` returns the calling thread's value, evaluating the initializer the first
/// time a thread reads it. A declaration typed `Option<T>` without an initializer
/// becomes a plain `ThreadLocal<T>`, whose `get` yields `None` until the thread
/// stores something.
///
/// Any declaration may name a deallocator with `dealloc = ...`; the default is
/// [`Deallocator::ambient`](crate::Deallocator::ambient).
///
/// # Example
///
/// ```rust
/// use thread_slot::{thread_slot, Deallocator};
///
/// fn release(buf: Vec<u8>) {
///     drop(buf);
/// }
///
/// thread_slot! {
///     /// Requests served by this thread.
///     static SERVED: u64 = 0;
///     static SCRATCH: Vec<u8> = Vec::new(), dealloc = Deallocator::custom(release);
///     pub static LAST_ERROR: Option<String>;
/// }
///
/// SERVED.set(SERVED.get() + 1);
/// assert_eq!(SERVED.get(), 1);
///
/// SCRATCH.with_mut(|buf| buf.extend_from_slice(b"abc"));
/// assert_eq!(SCRATCH.with(|buf| buf.len()), 3);
///
/// assert_eq!(LAST_ERROR.get(), None);
/// LAST_ERROR.set(Some("timeout".to_string()));
/// assert_eq!(LAST_ERROR.get().as_deref(), Some("timeout"));
/// ```
///
/// A non-optional declaration without an initializer is rejected:
///
/// ```compile_fail
/// thread_slot::thread_slot! {
///     static COUNTER: u64;
/// }
/// ```
#[macro_export]
macro_rules! thread_slot {
    () => {};
    (
        $(#[$attr:meta])* $vis:vis static $name:ident : Option<$t:ty>, dealloc = $dealloc:expr;
        $($rest:tt)*
    ) => {
        $(#[$attr])*
        $vis static $name: $crate::ThreadLocal<$t> = $crate::ThreadLocal::lazy($dealloc);
        $crate::thread_slot!($($rest)*);
    };
    (
        $(#[$attr:meta])* $vis:vis static $name:ident : Option<$t:ty>;
        $($rest:tt)*
    ) => {
        $(#[$attr])*
        $vis static $name: $crate::ThreadLocal<$t> =
            $crate::ThreadLocal::lazy($crate::Deallocator::ambient());
        $crate::thread_slot!($($rest)*);
    };
    (
        $(#[$attr:meta])* $vis:vis static $name:ident : $t:ty = $init:expr, dealloc = $dealloc:expr;
        $($rest:tt)*
    ) => {
        $(#[$attr])*
        $vis static $name: $crate::LocalKey<$t> = $crate::LocalKey::new(
            $crate::ThreadLocal::lazy($dealloc),
            {
                fn __init() -> $t {
                    $init
                }
                __init
            },
        );
        $crate::thread_slot!($($rest)*);
    };
    (
        $(#[$attr:meta])* $vis:vis static $name:ident : $t:ty = $init:expr;
        $($rest:tt)*
    ) => {
        $crate::thread_slot!(
            $(#[$attr])* $vis static $name: $t = $init, dealloc = $crate::Deallocator::ambient();
            $($rest)*
        );
    };
    (
        $(#[$attr:meta])* $vis:vis static $name:ident : $t:ty;
        $($rest:tt)*
    ) => {
        compile_error!(concat!(
            "thread-local `",
            stringify!($name),
            "` has a non-optional type and needs an initializer expression",
        ));
    };
}
