//! Thread synchronization primitives
//!
//! Futexes over the sandbox's atomic wait, mutex attributes with the
//! priority-inheritance support check, and the mutex and condition variable built on
//! top of them.

pub mod condvar;
pub mod futex;
pub mod mutex;
pub mod mutex_attr;

pub use condvar::Condvar;
pub use futex::{futex_wait, futex_wake, FutexWord, WakeCount};
pub use mutex::Mutex;
pub use mutex_attr::{MutexAttr, MutexKind, MutexProtocol, PiSupport};
