//! Per-thread storage cells.
//!
//! The module is layered from the leaves up:
//! - `dealloc` decides what happens to a value that leaves its slot.
//! - `slot` is the heap box a thread's value lives in while the OS key owns it.
//! - `thread_local` is the shared cell that hands boxes to and from the key.
//! - `local_key` pairs a cell with a default initializer for declared statics.

pub mod dealloc;
pub mod local_key;
mod slot;
pub mod thread_local;

pub use dealloc::{Deallocator, DeallocatorKind, RawPointer};
pub use local_key::LocalKey;
pub use thread_local::ThreadLocal;
