//! Futex wait/wake over the sandbox's atomic wait
//!
//! There is no futex syscall. A wait is `atomic_wait32` on the word, which
//! compares and sleeps atomically with respect to `atomic_notify`, and a wake
//! is `atomic_notify`. Wakeups may be spurious; every caller loops on its own
//! condition.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::kernel_interface::{Sandbox, WaitOutcome};
use crate::translation::{from_sandbox, Errno};
use crate::Runtime;

/// How many waiters a wake should release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCount {
    /// At most this many
    Count(u32),
    /// Every waiter
    All,
}

impl WakeCount {
    /// Decode the C argument: negative means everyone
    pub fn from_raw(count: i32) -> Self {
        u32::try_from(count).map_or(Self::All, Self::Count)
    }

    #[inline]
    fn to_sandbox(self) -> u32 {
        match self {
            Self::Count(n) => n,
            Self::All => u32::MAX,
        }
    }
}

/// Block while `word` holds `expected`
///
/// Returns `NotEqual` without sleeping when the word already changed.
pub fn futex_wait<S: Sandbox + ?Sized>(
    sandbox: &S,
    word: &AtomicU32,
    expected: u32,
) -> Result<WaitOutcome, Errno> {
    sandbox.atomic_wait32(word, expected).map_err(from_sandbox)
}

/// Wake up to `count` threads blocked on `word`, returning how many woke
pub fn futex_wake<S: Sandbox + ?Sized>(
    sandbox: &S,
    word: &AtomicU32,
    count: WakeCount,
) -> Result<u32, Errno> {
    if count == WakeCount::Count(0) {
        return Ok(0);
    }
    sandbox
        .atomic_notify(word, count.to_sandbox())
        .map_err(from_sandbox)
}

/// A futex word that knows whether anybody is waiting on it
///
/// `wake` skips the sandbox call when the waiter count is zero. The value
/// must be changed with `SeqCst` before `wake` is called for that to be
/// sound: a waiter registers itself before the sandbox compares the value.
#[derive(Debug, Default)]
pub struct FutexWord {
    value: AtomicU32,
    waiters: AtomicU32,
}

impl FutexWord {
    /// Create a word holding `value`
    pub const fn new(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
            waiters: AtomicU32::new(0),
        }
    }

    /// The word itself
    #[inline]
    pub fn value(&self) -> &AtomicU32 {
        &self.value
    }

    /// Threads currently inside [`FutexWord::wait`]
    #[inline]
    pub fn waiters(&self) -> u32 {
        self.waiters.load(Ordering::SeqCst)
    }

    /// Block while the word holds `expected`
    pub fn wait<S: Sandbox + ?Sized>(
        &self,
        sandbox: &S,
        expected: u32,
    ) -> Result<WaitOutcome, Errno> {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let outcome = futex_wait(sandbox, &self.value, expected);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    /// Wake up to `count` waiters
    pub fn wake<S: Sandbox + ?Sized>(&self, sandbox: &S, count: WakeCount) -> Result<u32, Errno> {
        if self.waiters.load(Ordering::SeqCst) == 0 {
            return Ok(0);
        }
        futex_wake(sandbox, &self.value, count)
    }
}

impl<S: Sandbox> Runtime<S> {
    /// `futex_wait` on a raw word
    pub fn futex_wait(&self, word: &AtomicU32, expected: u32) -> Result<WaitOutcome, Errno> {
        log::trace!("[POSIX-WASIX] futex_wait({:p}, {})", word, expected);
        futex_wait(self.sandbox(), word, expected)
    }

    /// `futex_wake` on a raw word
    pub fn futex_wake(&self, word: &AtomicU32, count: WakeCount) -> Result<u32, Errno> {
        log::trace!("[POSIX-WASIX] futex_wake({:p}, {:?})", word, count);
        futex_wake(self.sandbox(), word, count)
    }
}
