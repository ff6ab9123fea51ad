//! # POSIX Compatibility Types and Constants
//!
//! Types and flag values of the POSIX surface, using the numbering of the
//! sandbox's C library.

/// POSIX file descriptor
pub type Fd = i32;

/// POSIX offset
pub type Off = i64;

/// `*at` flag values
pub mod at_flags {
    /// No implicit working directory; routed through the pre-open table
    pub const AT_FDCWD: i32 = -2;
    pub const AT_EACCESS: i32 = 0x0;
    pub const AT_SYMLINK_NOFOLLOW: i32 = 0x1;
    pub const AT_SYMLINK_FOLLOW: i32 = 0x2;
    pub const AT_REMOVEDIR: i32 = 0x4;
}

/// `access` mode bits
pub mod access {
    pub const F_OK: i32 = 0;
    pub const X_OK: i32 = 1;
    pub const W_OK: i32 = 2;
    pub const R_OK: i32 = 4;
}

/// `tv_nsec` markers understood by `utimensat`
pub const UTIME_NOW: i64 = -1;
pub const UTIME_OMIT: i64 = -2;

/// pthread attribute values
pub mod pthread {
    pub const PTHREAD_PRIO_NONE: i32 = 0;
    pub const PTHREAD_PRIO_INHERIT: i32 = 1;
    pub const PTHREAD_PRIO_PROTECT: i32 = 2;

    pub const PTHREAD_MUTEX_NORMAL: i32 = 0;
    pub const PTHREAD_MUTEX_RECURSIVE: i32 = 1;
    pub const PTHREAD_MUTEX_ERRORCHECK: i32 = 2;

    pub const PTHREAD_PROCESS_PRIVATE: i32 = 0;
    pub const PTHREAD_PROCESS_SHARED: i32 = 1;
}

/// Clock values
pub mod clock {
    pub const CLOCK_REALTIME: i32 = 0;
    pub const CLOCK_MONOTONIC: i32 = 1;
    pub const CLOCK_PROCESS_CPUTIME_ID: i32 = 2;
    pub const CLOCK_THREAD_CPUTIME_ID: i32 = 3;

    pub const TIMER_ABSTIME: i32 = 0x1;
}

/// POSIX timespec structure
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl Timespec {
    /// Nanoseconds in one second
    pub const NSEC_PER_SEC: i64 = 1_000_000_000;

    /// Create a timespec
    pub const fn new(tv_sec: i64, tv_nsec: i64) -> Self {
        Self { tv_sec, tv_nsec }
    }

    /// Check `tv_nsec` is within `[0, 1e9)`
    pub const fn is_normalized(&self) -> bool {
        self.tv_nsec >= 0 && self.tv_nsec < Self::NSEC_PER_SEC
    }

    /// Total nanoseconds, saturating; `None` for negative times
    pub fn as_nanos(&self) -> Option<u64> {
        let secs = u64::try_from(self.tv_sec).ok()?;
        let nsecs = u64::try_from(self.tv_nsec).ok()?;
        Some(secs.saturating_mul(Self::NSEC_PER_SEC as u64).saturating_add(nsecs))
    }

    /// Exact nanosecond timestamp; `None` when negative, unnormalized or
    /// beyond `u64`
    pub fn to_timestamp(&self) -> Option<u64> {
        if !self.is_normalized() {
            return None;
        }
        let secs = u64::try_from(self.tv_sec).ok()?;
        secs.checked_mul(Self::NSEC_PER_SEC as u64)?
            .checked_add(self.tv_nsec as u64)
    }
}
