//! Futex-based condition variable
//!
//! A sequence counter: waiters sleep on the value they read before releasing
//! the mutex, and every signal bumps it. A signal that lands between the
//! unlock and the wait changes the word, so the wait returns at once.

use core::num::NonZeroU32;
use core::sync::atomic::Ordering;

use crate::kernel_interface::Sandbox;
use crate::translation::Errno;

use super::futex::{FutexWord, WakeCount};
use super::mutex::Mutex;

/// `pthread_cond_t`
#[derive(Debug, Default)]
pub struct Condvar {
    seq: FutexWord,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            seq: FutexWord::new(0),
        }
    }

    /// `pthread_cond_wait`
    ///
    /// `mutex` must be held by `tid`; it is held again on return, including
    /// when the wait itself failed. Wakeups may be spurious.
    pub fn wait<S: Sandbox + ?Sized>(
        &self,
        sandbox: &S,
        mutex: &Mutex,
        tid: NonZeroU32,
    ) -> Result<(), Errno> {
        let seq = self.seq.value().load(Ordering::SeqCst);
        mutex.unlock(sandbox, tid)?;
        let waited = self.seq.wait(sandbox, seq);
        mutex.lock(sandbox, tid)?;
        waited.map(|_| ())
    }

    /// `pthread_cond_signal`
    pub fn signal<S: Sandbox + ?Sized>(&self, sandbox: &S) -> Result<(), Errno> {
        self.seq.value().fetch_add(1, Ordering::SeqCst);
        self.seq.wake(sandbox, WakeCount::Count(1)).map(|_| ())
    }

    /// `pthread_cond_broadcast`
    pub fn broadcast<S: Sandbox + ?Sized>(&self, sandbox: &S) -> Result<(), Errno> {
        self.seq.value().fetch_add(1, Ordering::SeqCst);
        self.seq.wake(sandbox, WakeCount::All).map(|_| ())
    }
}
