//! # POSIX-WASIX Compatibility Core
//!
//! Runs POSIX-shaped calls on a capability-based sandbox that has no global
//! filesystem namespace, no futex syscall and no native `setjmp`/`longjmp`.
//! Every call is translated into a handle-based request, and every failure
//! comes back as exactly one POSIX errno.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          abi: sentinel + errno / pthread error numbers      │
//! └───────────────────────────┬─────────────────────────────────┘
//!                             │
//!              ┌──────────────┼──────────────┐
//!              ▼              ▼              ▼
//!     ┌────────────┐  ┌────────────┐  ┌────────────┐
//!     │ vfs_posix  │  │    sync    │  │   thread   │
//!     │ preopens,  │  │ futex, PI  │  │ TLS, sp,   │
//!     │ *at calls  │  │ mutex      │  │ setjmp     │
//!     └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!           │               │               │
//!           ▼               ▼               ▼
//!     ┌────────────────────────────────────────────┐
//!     │         kernel_interface::Sandbox          │
//!     └─────────────────────┬──────────────────────┘
//!                           │ SandboxErrno
//!                           ▼
//!     ┌────────────────────────────────────────────┐
//!     │  translation: errno table + directory fixup│
//!     └────────────────────────────────────────────┘
//! ```
//!
//! Process-wide state (the pre-open registry and the priority-inheritance
//! support flag) lives in an explicit [`Runtime`]; per-thread state lives in a
//! [`ThreadContext`] owned by that thread.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use posix_wasix::{Config, Runtime};
//!
//! let config = Config::from_cmdline("posix.unlink_dir=eperm")?;
//! let rt = Runtime::init(sandbox, config)?;
//!
//! let mut buf = [0u8; 256];
//! let n = rt.readlink("/tmp/current", &mut buf)?;
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod abi;
pub mod compat;
pub mod config;
pub mod kernel_interface;
pub mod sync;
pub mod thread;
pub mod time;
pub mod translation;
pub mod vfs_posix;

#[cfg(test)]
mod testing;

// Re-exports for public API
pub use config::Config;
pub use kernel_interface::{Handle, Sandbox, SandboxErrno};
pub use sync::{MutexAttr, MutexProtocol, PiSupport};
pub use thread::{Checkpoint, JumpBuf, ThreadContext};
pub use translation::Errno;
pub use vfs_posix::{PreopenRegistry, ResolvedPath};

/// POSIX-WASIX version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process-wide context of the compatibility layer
///
/// Owns the sandbox connection, the pre-open registry and the memoised
/// priority-inheritance support check. Shared by every thread of the process.
pub struct Runtime<S: Sandbox> {
    sandbox: S,
    config: Config,
    preopens: PreopenRegistry,
    pi_support: PiSupport,
}

impl<S: Sandbox> Runtime<S> {
    /// Create a runtime with an empty pre-open registry
    pub fn new(sandbox: S, config: Config) -> Self {
        Self {
            preopens: PreopenRegistry::new(config.max_preopens()),
            pi_support: PiSupport::new(),
            sandbox,
            config,
        }
    }

    /// Create a runtime and register every directory the sandbox pre-opened
    ///
    /// # Errors
    ///
    /// The errno of the first pre-open that could not be described or
    /// registered.
    pub fn init(sandbox: S, config: Config) -> Result<Self, Errno> {
        log::info!("[POSIX-WASIX] v{} initializing...", VERSION);
        log::debug!("[POSIX-WASIX] config: {}", config.export_config());

        let runtime = Self::new(sandbox, config);
        let found = runtime.preopens.populate(&runtime.sandbox)?;

        log::info!("[POSIX-WASIX] initialized with {} preopen(s)", found);
        Ok(runtime)
    }

    #[inline]
    pub fn sandbox(&self) -> &S {
        &self.sandbox
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn preopens(&self) -> &PreopenRegistry {
        &self.preopens
    }

    #[inline]
    pub fn pi_support(&self) -> &PiSupport {
        &self.pi_support
    }

    /// Make `prefix` resolve through directory handle `fd`
    ///
    /// The prefix is copied. Registrations are never removed.
    pub fn register_preopened_fd(&self, fd: i32, prefix: &str) -> Result<(), Errno> {
        self.preopens.register(fd, prefix)
    }
}
