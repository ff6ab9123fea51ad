//! # POSIX Calling Convention
//!
//! The C-shaped surface of the layer. Each function wraps a [`Runtime`]
//! operation and reports failure the POSIX way:
//!
//! - file and sleep calls return `-1` and store the error in the calling
//!   thread's errno slot
//! - `pthread_*` and `clock_nanosleep` return the error number itself
//!
//! Success never writes errno. Paths arrive as C strings; one that is not
//! valid UTF-8 cannot name anything in the sandbox and fails with `EILSEQ`.

use core::ffi::{c_int, CStr};
use core::sync::atomic::AtomicU32;

use crate::compat::at_flags::AT_FDCWD;
use crate::compat::{Fd, Off, Timespec};
use crate::kernel_interface::{FileStat, Sandbox};
use crate::sync::{Condvar, Mutex, MutexAttr, WakeCount};
use crate::thread::{fatal, JumpBuf, ThreadContext};
use crate::translation::Errno;
use crate::Runtime;

fn path_str(path: &CStr) -> Result<&str, Errno> {
    path.to_str().map_err(|_| Errno::EILSEQ)
}

/// `0`, or `-1` with errno set
fn status(ctx: &ThreadContext, result: Result<(), Errno>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(errno) => {
            ctx.set_errno(errno);
            -1
        }
    }
}

/// Error number for `pthread_*` style returns
fn error_number(result: Result<(), Errno>) -> c_int {
    result.err().map_or(0, Errno::as_i32)
}

// =============================================================================
// FILES
// =============================================================================

/// Register a pre-opened directory; `prefix` is copied
pub fn register_preopened_fd<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    fd: Fd,
    prefix: &CStr,
) -> c_int {
    let result = path_str(prefix).and_then(|prefix| rt.register_preopened_fd(fd, prefix));
    status(ctx, result)
}

/// `readlinkat(2)`: bytes written, never NUL-terminated
pub fn readlinkat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    fd: Fd,
    path: &CStr,
    buf: &mut [u8],
) -> isize {
    match path_str(path).and_then(|path| rt.readlinkat(fd, path, buf)) {
        // at most buf.len(), which fits in isize
        Ok(used) => used as isize,
        Err(errno) => {
            ctx.set_errno(errno);
            -1
        }
    }
}

/// `readlink(2)`
pub fn readlink<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    path: &CStr,
    buf: &mut [u8],
) -> isize {
    readlinkat(rt, ctx, AT_FDCWD, path, buf)
}

/// `unlinkat(2)`
pub fn unlinkat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    fd: Fd,
    path: &CStr,
    flags: c_int,
) -> c_int {
    let result = path_str(path).and_then(|path| rt.unlinkat(fd, path, flags));
    status(ctx, result)
}

/// `fstatat(2)`; `stat` is only written on success
pub fn fstatat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    fd: Fd,
    path: &CStr,
    stat: &mut FileStat,
    flags: c_int,
) -> c_int {
    let result = path_str(path)
        .and_then(|path| rt.fstatat(fd, path, flags))
        .map(|found| *stat = found);
    status(ctx, result)
}

/// `lseek(fd, 0, SEEK_CUR)`
pub fn tell<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, fd: Fd) -> Off {
    rt.tell(fd).unwrap_or_else(|errno| {
        ctx.set_errno(errno);
        -1
    })
}

/// `faccessat(2)`
pub fn faccessat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    fd: Fd,
    path: &CStr,
    mode: c_int,
    flags: c_int,
) -> c_int {
    let result = path_str(path).and_then(|path| rt.faccessat(fd, path, mode, flags));
    status(ctx, result)
}

/// `faccessat` through the pre-open registry
pub fn access<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    path: &CStr,
    mode: c_int,
    flags: c_int,
) -> c_int {
    faccessat(rt, ctx, AT_FDCWD, path, mode, flags)
}

/// `utimensat(2)`; `None` sets both times to now
pub fn utimensat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    fd: Fd,
    path: &CStr,
    times: Option<&[Timespec; 2]>,
    flags: c_int,
) -> c_int {
    let result = path_str(path).and_then(|path| rt.utimensat(fd, path, times, flags));
    status(ctx, result)
}

/// `utimensat` through the pre-open registry
pub fn utimens<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    path: &CStr,
    times: Option<&[Timespec; 2]>,
    flags: c_int,
) -> c_int {
    utimensat(rt, ctx, AT_FDCWD, path, times, flags)
}

/// `linkat(2)`
pub fn linkat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_fd: Fd,
    old_path: &CStr,
    new_fd: Fd,
    new_path: &CStr,
    flags: c_int,
) -> c_int {
    let result = path_str(old_path).and_then(|old_path| {
        let new_path = path_str(new_path)?;
        rt.linkat(old_fd, old_path, new_fd, new_path, flags)
    });
    status(ctx, result)
}

/// `linkat` with both paths through the pre-open registry
pub fn link<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_path: &CStr,
    new_path: &CStr,
    flags: c_int,
) -> c_int {
    linkat(rt, ctx, AT_FDCWD, old_path, AT_FDCWD, new_path, flags)
}

/// `linkat` with an explicit source directory only
pub fn link_oldat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_fd: Fd,
    old_path: &CStr,
    new_path: &CStr,
    flags: c_int,
) -> c_int {
    linkat(rt, ctx, old_fd, old_path, AT_FDCWD, new_path, flags)
}

/// `linkat` with an explicit destination directory only
pub fn link_newat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_path: &CStr,
    new_fd: Fd,
    new_path: &CStr,
    flags: c_int,
) -> c_int {
    linkat(rt, ctx, AT_FDCWD, old_path, new_fd, new_path, flags)
}

/// `renameat(2)`
pub fn renameat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_fd: Fd,
    old_path: &CStr,
    new_fd: Fd,
    new_path: &CStr,
) -> c_int {
    let result = path_str(old_path).and_then(|old_path| {
        let new_path = path_str(new_path)?;
        rt.renameat(old_fd, old_path, new_fd, new_path)
    });
    status(ctx, result)
}

/// `rename(2)`
pub fn rename<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_path: &CStr,
    new_path: &CStr,
) -> c_int {
    renameat(rt, ctx, AT_FDCWD, old_path, AT_FDCWD, new_path)
}

/// `renameat` with an explicit source directory only
pub fn rename_oldat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_fd: Fd,
    old_path: &CStr,
    new_path: &CStr,
) -> c_int {
    renameat(rt, ctx, old_fd, old_path, AT_FDCWD, new_path)
}

/// `renameat` with an explicit destination directory only
pub fn rename_newat<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    old_path: &CStr,
    new_fd: Fd,
    new_path: &CStr,
) -> c_int {
    renameat(rt, ctx, AT_FDCWD, old_path, new_fd, new_path)
}

/// Move `fd` to `newfd`, like `dup2` followed by `close(fd)`
pub fn fd_renumber<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, fd: Fd, newfd: Fd) -> c_int {
    status(ctx, rt.fd_renumber(fd, newfd))
}

// =============================================================================
// TIME
// =============================================================================

/// `nanosleep(2)`
pub fn nanosleep<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, request: &Timespec) -> c_int {
    status(ctx, rt.nanosleep(request))
}

/// `clock_nanosleep(2)`: returns the error number
pub fn clock_nanosleep<S: Sandbox>(
    rt: &Runtime<S>,
    clock: c_int,
    flags: c_int,
    request: &Timespec,
) -> c_int {
    error_number(rt.clock_nanosleep(clock, flags, request))
}

// =============================================================================
// PTHREAD
// =============================================================================

pub fn pthread_mutexattr_init(attr: &mut MutexAttr) -> c_int {
    *attr = MutexAttr::new();
    0
}

pub fn pthread_mutexattr_setprotocol<S: Sandbox>(
    rt: &Runtime<S>,
    attr: &mut MutexAttr,
    protocol: c_int,
) -> c_int {
    error_number(rt.mutexattr_setprotocol(attr, protocol))
}

pub fn pthread_mutexattr_getprotocol(attr: &MutexAttr, protocol: &mut c_int) -> c_int {
    *protocol = attr.protocol().as_raw();
    0
}

pub fn pthread_mutexattr_settype(attr: &mut MutexAttr, kind: c_int) -> c_int {
    error_number(attr.set_kind(kind))
}

pub fn pthread_mutexattr_gettype(attr: &MutexAttr, kind: &mut c_int) -> c_int {
    *kind = attr.kind().as_raw();
    0
}

pub fn pthread_mutexattr_setpshared(attr: &mut MutexAttr, pshared: c_int) -> c_int {
    error_number(attr.set_pshared(pshared))
}

pub fn pthread_mutex_lock<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, m: &Mutex) -> c_int {
    error_number(m.lock(rt.sandbox(), ctx.tid()))
}

pub fn pthread_mutex_trylock(ctx: &ThreadContext, m: &Mutex) -> c_int {
    error_number(m.try_lock(ctx.tid()))
}

pub fn pthread_mutex_unlock<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, m: &Mutex) -> c_int {
    error_number(m.unlock(rt.sandbox(), ctx.tid()))
}

pub fn pthread_cond_wait<S: Sandbox>(
    rt: &Runtime<S>,
    ctx: &ThreadContext,
    cond: &Condvar,
    m: &Mutex,
) -> c_int {
    error_number(cond.wait(rt.sandbox(), m, ctx.tid()))
}

pub fn pthread_cond_signal<S: Sandbox>(rt: &Runtime<S>, cond: &Condvar) -> c_int {
    error_number(cond.signal(rt.sandbox()))
}

pub fn pthread_cond_broadcast<S: Sandbox>(rt: &Runtime<S>, cond: &Condvar) -> c_int {
    error_number(cond.broadcast(rt.sandbox()))
}

// =============================================================================
// FUTEX
// =============================================================================

/// Block while `*word == expected`; returns on wake, change or spurious wake
pub fn futex_wait<S: Sandbox>(rt: &Runtime<S>, word: &AtomicU32, expected: u32) {
    if let Err(errno) = rt.futex_wait(word, expected) {
        log::warn!("[POSIX-WASIX] futex_wait failed: {}", errno);
    }
}

/// Wake up to `count` waiters on `word`; a negative count wakes all
pub fn futex_wake<S: Sandbox>(rt: &Runtime<S>, word: &AtomicU32, count: c_int) {
    if let Err(errno) = rt.futex_wake(word, WakeCount::from_raw(count)) {
        log::warn!("[POSIX-WASIX] futex_wake failed: {}", errno);
    }
}

// =============================================================================
// EXECUTION CONTEXT
// =============================================================================

pub fn get_stack_pointer(ctx: &ThreadContext) -> usize {
    ctx.stack_pointer()
}

pub fn set_stack_pointer(ctx: &ThreadContext, sp: usize) {
    ctx.set_stack_pointer(sp);
}

pub fn get_tls_base(ctx: &ThreadContext) -> usize {
    ctx.tls_base()
}

pub fn set_tls_base(ctx: &ThreadContext, base: usize) {
    ctx.set_tls_base(base);
}

/// Set up this thread's TLS block at `base`; aborts on a bad layout
pub fn init_tls<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, base: usize) {
    ctx.init_tls(rt.sandbox(), base);
}

pub fn tls_size<S: Sandbox>(rt: &Runtime<S>) -> usize {
    rt.tls_size()
}

pub fn tls_align<S: Sandbox>(rt: &Runtime<S>) -> usize {
    rt.tls_align()
}

/// `setjmp(3)`: 0 on capture, the `longjmp` value on resume
///
/// There is no way to report a failed checkpoint through `setjmp`, so one
/// aborts the process.
pub fn setjmp<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, buf: &mut JumpBuf) -> c_int {
    match rt.setjmp(ctx, buf) {
        Ok(checkpoint) => checkpoint.as_raw(),
        Err(errno) => fatal(format_args!("setjmp: stack checkpoint failed: {}", errno)),
    }
}

/// `longjmp(3)`
pub fn longjmp<S: Sandbox>(rt: &Runtime<S>, ctx: &ThreadContext, buf: &JumpBuf, value: c_int) -> ! {
    rt.longjmp(ctx, buf, value)
}
