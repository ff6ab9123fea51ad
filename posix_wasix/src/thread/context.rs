//! Per-thread execution context

use core::cell::Cell;
use core::num::NonZeroU32;

use crate::kernel_interface::{Sandbox, TlsLayout};
use crate::translation::Errno;
use crate::Runtime;

use super::fatal;

/// State owned by one thread
///
/// Created at thread start and only ever touched by that thread, so it is
/// deliberately not `Sync`.
#[derive(Debug)]
pub struct ThreadContext {
    tid: NonZeroU32,
    stack_pointer: Cell<usize>,
    tls_base: Cell<usize>,
    tls_layout: Cell<Option<TlsLayout>>,
    errno: Cell<i32>,
}

impl ThreadContext {
    /// Context for thread `tid` starting with `stack_pointer`
    pub const fn new(tid: NonZeroU32, stack_pointer: usize) -> Self {
        Self {
            tid,
            stack_pointer: Cell::new(stack_pointer),
            tls_base: Cell::new(0),
            tls_layout: Cell::new(None),
            errno: Cell::new(0),
        }
    }

    #[inline]
    pub fn tid(&self) -> NonZeroU32 {
        self.tid
    }

    #[inline]
    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer.get()
    }

    #[inline]
    pub fn set_stack_pointer(&self, sp: usize) {
        self.stack_pointer.set(sp);
    }

    #[inline]
    pub fn tls_base(&self) -> usize {
        self.tls_base.get()
    }

    #[inline]
    pub fn set_tls_base(&self, base: usize) {
        self.tls_base.set(base);
    }

    /// Layout recorded by [`ThreadContext::init_tls`]
    pub fn tls_layout(&self) -> Option<TlsLayout> {
        self.tls_layout.get()
    }

    /// Current `errno`
    #[inline]
    pub fn errno(&self) -> i32 {
        self.errno.get()
    }

    #[inline]
    pub fn set_errno(&self, errno: Errno) {
        self.errno.set(errno.as_i32());
    }

    /// Set up the TLS block at `base`
    ///
    /// The sandbox copies the initialisation image there, then `base` becomes
    /// the thread's TLS base. A layout alignment that is zero, not a power of
    /// two, or not met by `base` aborts the process.
    pub fn init_tls<S: Sandbox + ?Sized>(&self, sandbox: &S, base: usize) {
        let layout = sandbox.tls_layout();
        if !layout.align.is_power_of_two() {
            fatal(format_args!("invalid TLS alignment {}", layout.align));
        }
        if base % layout.align != 0 {
            fatal(format_args!(
                "TLS base {:#x} not aligned to {}",
                base, layout.align
            ));
        }

        sandbox.tls_init(base);
        self.tls_base.set(base);
        self.tls_layout.set(Some(layout));
        log::trace!(
            "[POSIX-WASIX] tid {} TLS at {:#x} ({} bytes, align {})",
            self.tid,
            base,
            layout.size,
            layout.align
        );
    }
}

impl<S: Sandbox> Runtime<S> {
    /// Size of the TLS block new threads need
    pub fn tls_size(&self) -> usize {
        self.sandbox().tls_layout().size
    }

    /// Alignment the TLS block needs
    pub fn tls_align(&self) -> usize {
        self.sandbox().tls_layout().align
    }
}
