//! # `thread_slot` - Per-Thread Storage Cells
//!
//! One shared handle, one private value per thread. A [`ThreadLocal<T>`] can be
//! declared once (typically as a `static`) and used from any number of threads;
//! each thread transparently gets its own instance, and every instance is
//! disposed of exactly once through a caller-chosen [`Deallocator`].
//!
//! This is the tool for per-thread resources that are expensive to build or not
//! safe to share: parser scratch buffers, compression contexts, PRNG state,
//! connection handles.
//!
//! ## Safety Guarantees
//!
//! ### Thread Isolation
//! - **No cross-thread observation**: values live under an OS thread-specific key
//!   (`pthread_key_create` / `FlsAlloc`), indexed by the calling thread. The cell
//!   object only holds the key and the deallocator.
//! - **Shareable for any `T`**: because no value ever leaves its thread,
//!   `ThreadLocal<T>` is `Send + Sync` even for `!Send` values such as raw
//!   pointers or `Rc`. This is asserted at compile time below.
//!
//! ### Exactly-Once Disposal
//! - **Replace**: `set(Some(v2))` installs `v2`, then disposes of the old value.
//! - **Clear**: `set(None)` takes the box out of the registry, then disposes.
//! - **Thread exit**: the key's destructor reclaims whatever the thread left.
//!
//! Clearing removes the pointer from the registry before the box is freed, so
//! the two reclamation paths can never both see the same box.
//!
//! ### Lazy Defaults
//! [`ThreadLocal::get_or_init`] evaluates its default only when the calling
//! thread's slot is empty. Defaults may have side effects.
//!
//! ## Architecture
//!
//! ```text
//! ThreadLocal<T> ──► LazyKey ──► OS key ──► per-thread *mut c_void
//!        │                                        │
//!        └── Deallocator<T> ◄── copied into ── Slot<T> (Box)
//! ```
//!
//! 1. **Deallocator** (`Deallocator<T>`): ambient drop, a custom `fn(T)`, or
//!    `libc::free` for pointer-shaped values.
//! 2. **Slot** (internal): the heap box holding one value and its deallocator.
//! 3. **Key** (internal): the OS key, allocated once behind a compare-and-swap.
//! 4. **Cell** (`ThreadLocal<T>`, `LocalKey<T>`): the public get/set surface.
//! 5. **Declaration** ([`thread_slot!`]): statics with initializers.
//!
//! ## Example
//!
//! ```rust
//! use thread_slot::{thread_slot, Deallocator};
//!
//! struct Ctx(u64);
//!
//! fn new_ctx() -> *mut Ctx {
//!     Box::into_raw(Box::new(Ctx(0)))
//! }
//!
//! fn free_ctx(ctx: *mut Ctx) {
//!     drop(unsafe { Box::from_raw(ctx) });
//! }
//!
//! thread_slot! {
//!     static CTX: *mut Ctx = new_ctx(), dealloc = Deallocator::custom(free_ctx);
//! }
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|i| {
//!         std::thread::spawn(move || {
//!             let ctx = CTX.get();
//!             unsafe { (*ctx).0 = i };
//!             assert_eq!(unsafe { (*CTX.get()).0 }, i);
//!         })
//!     })
//!     .collect();
//! for h in handles {
//!     h.join().unwrap();
//! }
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[macro_use]
mod macros;

pub mod cell;
mod key;

pub use cell::{Deallocator, DeallocatorKind, LocalKey, RawPointer, ThreadLocal};
pub use key::KeyError;

// Compile-time assertions for layout and sharing claims
const _: () = {
    use core::mem;

    // A deallocator is a tag plus at most one function pointer.
    assert!(mem::size_of::<Deallocator<u64>>() <= mem::size_of::<usize>() * 2);

    // A cell is a key word, the key destructor and the deallocator.
    assert!(mem::size_of::<ThreadLocal<u64>>() <= mem::size_of::<usize>() * 4);
    assert!(mem::size_of::<ThreadLocal<[u8; 4096]>>() == mem::size_of::<ThreadLocal<u8>>());
};

// All mutable state of a cell lives in the OS registry, indexed by the calling
// thread; the cell's own fields are read-only after the key is published. Cells
// therefore stay shareable even when `T` is neither `Send` nor `Sync`.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<ThreadLocal<*mut u8>>();
    assert_send_sync::<ThreadLocal<std::rc::Rc<()>>>();
    assert_send_sync::<ThreadLocal<std::cell::Cell<u32>>>();
    assert_send_sync::<LocalKey<*mut u8>>();
    assert_send_sync::<Deallocator<std::rc::Rc<()>>>();
};
