//! `setjmp`/`longjmp` over stack snapshots
//!
//! The sandbox can checkpoint the stack and later rewind to it, making the
//! checkpoint return a second time. The bookkeeping stack pointer lives
//! outside that snapshot, so it is saved in the [`JumpBuf`] and put back
//! before the rewind.

use crate::kernel_interface::{Sandbox, StackSnapshot};
use crate::translation::{from_sandbox, Errno};
use crate::Runtime;

use super::{fatal, ThreadContext};

/// `jmp_buf`: a stack snapshot plus the saved stack pointer
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct JumpBuf {
    snapshot: StackSnapshot,
    stack_pointer: usize,
    armed: bool,
}

impl JumpBuf {
    pub const fn new() -> Self {
        Self {
            snapshot: StackSnapshot {
                user: 0,
                hash: [0; 2],
            },
            stack_pointer: 0,
            armed: false,
        }
    }

    /// Has a `setjmp` filled this buffer?
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Stack pointer restored by `longjmp`
    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }
}

/// How control reached the point after `setjmp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// First return: the context was just saved
    Captured,
    /// Returned again through `longjmp` with this (non-zero) value
    Resumed(i32),
}

impl Checkpoint {
    /// The C return value of `setjmp`
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Captured => 0,
            Self::Resumed(value) => value,
        }
    }
}

impl<S: Sandbox> Runtime<S> {
    /// Save the calling context into `buf`
    pub fn setjmp(&self, ctx: &ThreadContext, buf: &mut JumpBuf) -> Result<Checkpoint, Errno> {
        buf.stack_pointer = ctx.stack_pointer();
        let value = self
            .sandbox()
            .stack_checkpoint(&mut buf.snapshot)
            .map_err(from_sandbox)?;
        if value == 0 {
            buf.armed = true;
            return Ok(Checkpoint::Captured);
        }
        // longjmp widened the i32 through u32; undo that
        Ok(Checkpoint::Resumed(value as u32 as i32))
    }

    /// Resume the context saved in `buf`, making its `setjmp` yield `value`
    ///
    /// A `value` of 0 is delivered as 1.
    pub fn longjmp(&self, ctx: &ThreadContext, buf: &JumpBuf, value: i32) -> ! {
        if !buf.armed {
            fatal(format_args!("longjmp to a jmp_buf that was never set"));
        }
        ctx.set_stack_pointer(buf.stack_pointer);
        let value = if value == 0 { 1 } else { value };
        log::trace!(
            "[POSIX-WASIX] tid {} longjmp sp={:#x} value={}",
            ctx.tid(),
            buf.stack_pointer,
            value
        );
        self.sandbox()
            .stack_restore(&buf.snapshot, u64::from(value as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSandbox, Restore};
    use crate::Config;
    use core::num::NonZeroU32;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn setup() -> (Runtime<MockSandbox>, ThreadContext) {
        let rt = Runtime::new(MockSandbox::new(), Config::default());
        let ctx = ThreadContext::new(NonZeroU32::new(1).unwrap(), 0x9000);
        (rt, ctx)
    }

    fn restore_of(rt: &Runtime<MockSandbox>, ctx: &ThreadContext, buf: &JumpBuf, v: i32) -> Restore {
        let payload = catch_unwind(AssertUnwindSafe(|| {
            rt.longjmp(ctx, buf, v);
        }))
        .unwrap_err();
        *payload.downcast::<Restore>().unwrap()
    }

    #[test]
    fn test_setjmp_captures() {
        let (rt, ctx) = setup();
        let mut buf = JumpBuf::new();
        assert!(!buf.is_armed());
        assert_eq!(rt.setjmp(&ctx, &mut buf), Ok(Checkpoint::Captured));
        assert!(buf.is_armed());
        assert_eq!(buf.stack_pointer(), 0x9000);
    }

    #[test]
    fn test_longjmp_restores_stack_pointer_first() {
        let (rt, ctx) = setup();
        let mut buf = JumpBuf::new();
        rt.setjmp(&ctx, &mut buf).unwrap();

        ctx.set_stack_pointer(0x8800);
        let restore = restore_of(&rt, &ctx, &buf, 5);
        assert_eq!(ctx.stack_pointer(), 0x9000);
        assert_eq!(restore.value, 5);
        assert_eq!(restore.user, buf.snapshot.user);
    }

    #[test]
    fn test_longjmp_zero_becomes_one() {
        let (rt, ctx) = setup();
        let mut buf = JumpBuf::new();
        rt.setjmp(&ctx, &mut buf).unwrap();
        assert_eq!(restore_of(&rt, &ctx, &buf, 0).value, 1);
    }

    #[test]
    fn test_setjmp_resumed_value() {
        let (rt, ctx) = setup();
        let mut buf = JumpBuf::new();
        rt.sandbox().queue_resume(u64::from(-3i32 as u32));
        assert_eq!(rt.setjmp(&ctx, &mut buf), Ok(Checkpoint::Resumed(-3)));
        assert_eq!(Checkpoint::Resumed(-3).as_raw(), -3);
        assert_eq!(Checkpoint::Captured.as_raw(), 0);
    }

    #[test]
    #[should_panic(expected = "never set")]
    fn test_longjmp_unarmed_is_fatal() {
        let (rt, ctx) = setup();
        rt.longjmp(&ctx, &JumpBuf::new(), 1);
    }
}
