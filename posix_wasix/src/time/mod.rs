//! Sleeping
//!
//! `nanosleep` and `clock_nanosleep` on the sandbox's clock sleep. Sleeps are
//! not interruptible here, so the remaining time is never reported.

use crate::compat::clock::{CLOCK_REALTIME, TIMER_ABSTIME};
use crate::compat::Timespec;
use crate::kernel_interface::{ClockId, Sandbox, SleepDeadline};
use crate::translation::{from_sandbox, Errno};
use crate::Runtime;

impl<S: Sandbox> Runtime<S> {
    /// Sleep on `clock` for `request`, or until it when `TIMER_ABSTIME` is set
    ///
    /// An absolute deadline before the clock's epoch has already passed and
    /// returns at once.
    pub fn clock_nanosleep(&self, clock: i32, flags: i32, request: &Timespec) -> Result<(), Errno> {
        let clock = match ClockId::from_raw(clock) {
            Some(ClockId::ThreadCputime) | None => return Err(Errno::EINVAL),
            Some(clock) => clock,
        };
        if flags & !TIMER_ABSTIME != 0 || !request.is_normalized() {
            return Err(Errno::EINVAL);
        }

        let deadline = if flags & TIMER_ABSTIME != 0 {
            match request.as_nanos() {
                Some(nanos) => SleepDeadline::Absolute(nanos),
                None => return Ok(()),
            }
        } else {
            SleepDeadline::Relative(request.as_nanos().ok_or(Errno::EINVAL)?)
        };

        log::trace!("[POSIX-WASIX] clock_nanosleep({:?}, {:?})", clock, deadline);
        self.sandbox()
            .clock_sleep(clock, deadline)
            .map_err(from_sandbox)
    }

    /// Sleep for `request` on the realtime clock
    pub fn nanosleep(&self, request: &Timespec) -> Result<(), Errno> {
        self.clock_nanosleep(CLOCK_REALTIME, 0, request)
    }
}
