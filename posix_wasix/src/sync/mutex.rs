//! Futex-based mutex
//!
//! Lock word states: 0 = unlocked, 1 = locked, 2 = locked with waiters.
//! Uncontended lock and unlock never reach the sandbox. The owner's thread id
//! is kept next to the word so recursive and error-checking mutexes can tell
//! who holds them.

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::kernel_interface::Sandbox;
use crate::translation::Errno;

use super::futex::{FutexWord, WakeCount};
use super::mutex_attr::{MutexAttr, MutexKind, MutexProtocol};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
const CONTENDED: u32 = 2;

/// `pthread_mutex_t`
#[derive(Debug)]
pub struct Mutex {
    state: FutexWord,
    /// Owning thread id, 0 when free
    owner: AtomicU32,
    /// Recursion depth; only touched by the owner
    depth: AtomicU32,
    kind: MutexKind,
    protocol: MutexProtocol,
}

impl Mutex {
    /// Create an unlocked mutex of the given kind
    pub const fn new(kind: MutexKind) -> Self {
        Self {
            state: FutexWord::new(UNLOCKED),
            owner: AtomicU32::new(0),
            depth: AtomicU32::new(0),
            kind,
            protocol: MutexProtocol::None,
        }
    }

    /// `pthread_mutex_init`
    pub fn with_attr(attr: &MutexAttr) -> Self {
        Self {
            protocol: attr.protocol(),
            ..Self::new(attr.kind())
        }
    }

    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    pub fn protocol(&self) -> MutexProtocol {
        self.protocol
    }

    /// Is the mutex held by anyone?
    pub fn is_locked(&self) -> bool {
        self.state.value().load(Ordering::SeqCst) != UNLOCKED
    }

    fn held_by(&self, tid: NonZeroU32) -> bool {
        self.owner.load(Ordering::Relaxed) == tid.get()
    }

    /// Handle a lock attempt by the current owner; `None` when not owned
    fn relock(&self, tid: NonZeroU32, busy: Errno) -> Option<Result<(), Errno>> {
        if self.kind == MutexKind::Normal || !self.held_by(tid) {
            return None;
        }
        if self.kind != MutexKind::Recursive {
            return Some(Err(busy));
        }
        let depth = self.depth.load(Ordering::Relaxed);
        Some(match depth.checked_add(1) {
            Some(depth) => {
                self.depth.store(depth, Ordering::Relaxed);
                Ok(())
            }
            None => Err(Errno::EAGAIN),
        })
    }

    fn acquired(&self, tid: NonZeroU32) {
        self.owner.store(tid.get(), Ordering::Relaxed);
        self.depth.store(1, Ordering::Relaxed);
    }

    /// `pthread_mutex_lock`
    pub fn lock<S: Sandbox + ?Sized>(&self, sandbox: &S, tid: NonZeroU32) -> Result<(), Errno> {
        if let Some(result) = self.relock(tid, Errno::EDEADLK) {
            return result;
        }

        let word = self.state.value();
        if word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            self.lock_slow(sandbox)?;
        }
        self.acquired(tid);
        Ok(())
    }

    #[cold]
    fn lock_slow<S: Sandbox + ?Sized>(&self, sandbox: &S) -> Result<(), Errno> {
        let word = self.state.value();
        loop {
            let state = word.load(Ordering::Relaxed);
            if state == UNLOCKED {
                if word
                    .compare_exchange(UNLOCKED, LOCKED, Ordering::SeqCst, Ordering::Relaxed)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }

            if state != CONTENDED && word.swap(CONTENDED, Ordering::SeqCst) == UNLOCKED {
                return Ok(());
            }

            self.state.wait(sandbox, CONTENDED)?;
        }
    }

    /// `pthread_mutex_trylock`
    pub fn try_lock(&self, tid: NonZeroU32) -> Result<(), Errno> {
        if let Some(result) = self.relock(tid, Errno::EBUSY) {
            return result;
        }

        self.state
            .value()
            .compare_exchange(UNLOCKED, LOCKED, Ordering::SeqCst, Ordering::Relaxed)
            .map_err(|_| Errno::EBUSY)?;
        self.acquired(tid);
        Ok(())
    }

    /// `pthread_mutex_unlock`
    pub fn unlock<S: Sandbox + ?Sized>(&self, sandbox: &S, tid: NonZeroU32) -> Result<(), Errno> {
        if self.kind != MutexKind::Normal {
            if !self.held_by(tid) {
                return Err(Errno::EPERM);
            }
            let depth = self.depth.load(Ordering::Relaxed);
            if depth > 1 {
                self.depth.store(depth - 1, Ordering::Relaxed);
                return Ok(());
            }
        }

        self.owner.store(0, Ordering::Relaxed);
        self.depth.store(0, Ordering::Relaxed);
        if self.state.value().swap(UNLOCKED, Ordering::SeqCst) == CONTENDED {
            self.state.wake(sandbox, WakeCount::Count(1))?;
        }
        Ok(())
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new(MutexKind::Normal)
    }
}
