//! Execution-context bootstrap
//!
//! Per-thread state the sandbox cannot keep for us: the bookkeeping stack
//! pointer, the TLS block, the errno slot, and the snapshots used by
//! `setjmp`/`longjmp`.

use core::fmt;

pub mod context;
pub mod jump;

pub use context::ThreadContext;
pub use jump::{Checkpoint, JumpBuf};

/// Abort on a misconfiguration the process cannot run with
///
/// Builds use `panic = "abort"`, so this terminates the process.
#[cold]
#[track_caller]
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    log::error!("[POSIX-WASIX] fatal: {}", args);
    panic!("{}", args)
}
