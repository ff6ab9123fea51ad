//! # Kernel Interface - Sandbox syscall surface
//!
//! The capability-based interface the POSIX layer is translated onto. There is
//! no global root, no raw futex syscall and no native stack unwinding; every
//! operation is expressed against a handle, an atomic memory word or an opaque
//! stack snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              POSIX call (readlink, pthread_*, ...)          │
//! └───────────────────────────┬─────────────────────────────────┘
//!                             │
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!   ┌────────────┐     ┌────────────┐     ┌────────────┐
//!   │  Preopen   │     │   Futex    │     │  Thread    │
//!   │  resolver  │     │  wait/wake │     │  context   │
//!   └─────┬──────┘     └─────┬──────┘     └─────┬──────┘
//!         │ path_*           │ atomic_*         │ stack_* / tls_*
//!         ▼                  ▼                  ▼
//!   ┌──────────────────────────────────────────────────┐
//!   │               Sandbox (this trait)               │
//!   └──────────────────────────────────────────────────┘
//! ```
//!
//! Implementations only report raw [`SandboxErrno`] codes; translating them
//! into POSIX `errno` values is the job of [`crate::translation`].

use core::fmt;
use core::sync::atomic::AtomicU32;

use bitflags::bitflags;

use crate::translation::Errno;

/// Directory or file handle in the sandbox's descriptor table
///
/// POSIX descriptors are signed; the sandbox only knows unsigned handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    /// Wrap a raw sandbox handle
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Convert a POSIX descriptor, rejecting negative values with `EBADF`
    #[inline]
    pub fn from_fd(fd: i32) -> Result<Self, Errno> {
        u32::try_from(fd).map(Self).map_err(|_| Errno::EBADF)
    }

    /// Get raw handle value
    #[inline]
    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    /// Get the POSIX descriptor for this handle
    ///
    /// Handles above `i32::MAX` have no descriptor number and give `EBADF`.
    #[inline]
    pub fn as_fd(&self) -> Result<i32, Errno> {
        i32::try_from(self.0).map_err(|_| Errno::EBADF)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}

/// Error codes reported by the sandbox (WASI numbering plus WASIX extensions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SandboxErrno {
    Success = 0,
    TooBig = 1,
    Access = 2,
    AddrInUse = 3,
    AddrNotAvail = 4,
    AfNoSupport = 5,
    Again = 6,
    Already = 7,
    BadF = 8,
    BadMsg = 9,
    Busy = 10,
    Canceled = 11,
    Child = 12,
    ConnAborted = 13,
    ConnRefused = 14,
    ConnReset = 15,
    Deadlk = 16,
    DestAddrReq = 17,
    Dom = 18,
    Dquot = 19,
    Exist = 20,
    Fault = 21,
    FBig = 22,
    HostUnreach = 23,
    Idrm = 24,
    Ilseq = 25,
    InProgress = 26,
    Intr = 27,
    Inval = 28,
    Io = 29,
    IsConn = 30,
    IsDir = 31,
    Loop = 32,
    MFile = 33,
    MLink = 34,
    MsgSize = 35,
    Multihop = 36,
    NameTooLong = 37,
    NetDown = 38,
    NetReset = 39,
    NetUnreach = 40,
    NFile = 41,
    NoBufs = 42,
    NoDev = 43,
    NoEnt = 44,
    NoExec = 45,
    NoLck = 46,
    NoLink = 47,
    NoMem = 48,
    NoMsg = 49,
    NoProtoOpt = 50,
    NoSpc = 51,
    NoSys = 52,
    NotConn = 53,
    NotDir = 54,
    NotEmpty = 55,
    NotRecoverable = 56,
    NotSock = 57,
    NotSup = 58,
    NoTty = 59,
    Nxio = 60,
    Overflow = 61,
    OwnerDead = 62,
    Perm = 63,
    Pipe = 64,
    Proto = 65,
    ProtoNoSupport = 66,
    ProtoType = 67,
    Range = 68,
    Rofs = 69,
    Spipe = 70,
    Srch = 71,
    Stale = 72,
    TimedOut = 73,
    TxtBsy = 74,
    Xdev = 75,
    /// Handle lacks the rights for the operation
    NotCapable = 76,
    Shutdown = 77,
    MemViolation = 78,
    /// The sandbox itself could not classify the failure
    Unknown = 79,
}

impl SandboxErrno {
    /// Highest code known to this table
    pub const MAX_RAW: u16 = Self::Unknown as u16;

    /// Get raw wire value
    #[inline]
    pub const fn as_raw(self) -> u16 {
        self as u16
    }

    /// Decode a raw wire value; `None` for codes outside the table
    pub fn from_raw(raw: u16) -> Option<Self> {
        use SandboxErrno::*;
        const TABLE: [SandboxErrno; 80] = [
            Success, TooBig, Access, AddrInUse, AddrNotAvail, AfNoSupport, Again, Already,
            BadF, BadMsg, Busy, Canceled, Child, ConnAborted, ConnRefused, ConnReset, Deadlk,
            DestAddrReq, Dom, Dquot, Exist, Fault, FBig, HostUnreach, Idrm, Ilseq, InProgress,
            Intr, Inval, Io, IsConn, IsDir, Loop, MFile, MLink, MsgSize, Multihop, NameTooLong,
            NetDown, NetReset, NetUnreach, NFile, NoBufs, NoDev, NoEnt, NoExec, NoLck, NoLink,
            NoMem, NoMsg, NoProtoOpt, NoSpc, NoSys, NotConn, NotDir, NotEmpty, NotRecoverable,
            NotSock, NotSup, NoTty, Nxio, Overflow, OwnerDead, Perm, Pipe, Proto, ProtoNoSupport,
            ProtoType, Range, Rofs, Spipe, Srch, Stale, TimedOut, TxtBsy, Xdev, NotCapable,
            Shutdown, MemViolation, Unknown,
        ];
        TABLE.get(usize::from(raw)).copied()
    }
}

/// Result type of every sandbox call
pub type SandboxResult<T> = Result<T, SandboxErrno>;

/// File type as reported by `fd_fdstat_get` / `path_filestat_get`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FileType {
    #[default]
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

bitflags! {
    /// Rights attached to a handle
    ///
    /// Only the rights the POSIX layer checks itself are named; the sandbox
    /// enforces the rest.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FdRights: u64 {
        const FD_READ = 1 << 1;
        const FD_WRITE = 1 << 6;
        const FD_READDIR = 1 << 14;

        const _ = !0;
    }
}

bitflags! {
    /// Path lookup flags
    ///
    /// Only `SYMLINK_FOLLOW` crosses into the sandbox; `DIRECTORY` records that
    /// the caller addressed the target as a directory (trailing slash), which
    /// forces a final symlink to be followed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LookupFlags: u32 {
        const SYMLINK_FOLLOW = 1 << 0;
        const DIRECTORY = 1 << 1;
    }
}

impl LookupFlags {
    /// Flags understood by the sandbox's `path_*` calls
    #[inline]
    pub fn to_sandbox(self) -> Self {
        if self.contains(Self::DIRECTORY) {
            Self::SYMLINK_FOLLOW
        } else {
            self & Self::SYMLINK_FOLLOW
        }
    }
}

bitflags! {
    /// Which timestamps `path_filestat_set_times` updates
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FstFlags: u16 {
        const ATIM = 1 << 0;
        const ATIM_NOW = 1 << 1;
        const MTIM = 1 << 2;
        const MTIM_NOW = 1 << 3;
    }
}

/// Descriptor status (`fd_fdstat_get`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FdStat {
    pub filetype: FileType,
    pub flags: u16,
    pub rights_base: FdRights,
    pub rights_inheriting: FdRights,
}

/// File attributes (`path_filestat_get`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub filetype: FileType,
    pub nlink: u64,
    pub size: u64,
    pub atim: u64,
    pub mtim: u64,
    pub ctim: u64,
}

/// Pre-open description (`fd_prestat_get`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prestat {
    /// Pre-opened directory whose name is `name_len` bytes long
    Dir { name_len: usize },
}

/// Clock identifiers accepted by the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ClockId {
    Realtime = 0,
    Monotonic = 1,
    ProcessCputime = 2,
    ThreadCputime = 3,
}

impl ClockId {
    /// Decode a POSIX `clockid_t`
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Realtime),
            1 => Some(Self::Monotonic),
            2 => Some(Self::ProcessCputime),
            3 => Some(Self::ThreadCputime),
            _ => None,
        }
    }
}

/// When a sleep ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepDeadline {
    /// Nanoseconds from now
    Relative(u64),
    /// Nanoseconds since the clock's epoch
    Absolute(u64),
}

/// Outcome of [`Sandbox::atomic_wait32`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The word did not hold the expected value; the thread never slept
    NotEqual,
    /// The thread slept and was woken (possibly spuriously)
    Woken,
}

/// Opaque stack/register snapshot taken by the sandbox
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackSnapshot {
    pub user: u64,
    pub hash: [u64; 2],
}

/// Thread-local storage layout reported by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsLayout {
    pub size: usize,
    pub align: usize,
}

/// Capability-based syscall interface
///
/// All descriptors are explicit; none of these calls consult a working
/// directory. Implementations must be shareable between threads.
pub trait Sandbox: Send + Sync {
    /// Describe a pre-opened descriptor; `BadF` once past the last one
    fn fd_prestat_get(&self, fd: Handle) -> SandboxResult<Prestat>;

    /// Copy a pre-opened directory's name into `buf`
    fn fd_prestat_dir_name(&self, fd: Handle, buf: &mut [u8]) -> SandboxResult<()>;

    /// Descriptor type, flags and rights
    fn fd_fdstat_get(&self, fd: Handle) -> SandboxResult<FdStat>;

    /// Current file offset
    fn fd_tell(&self, fd: Handle) -> SandboxResult<u64>;

    /// Read a symlink target into `buf`
    ///
    /// Returns the number of bytes used. Implementations may report the full
    /// target length even when it exceeds `buf`.
    fn path_readlink(&self, fd: Handle, path: &str, buf: &mut [u8]) -> SandboxResult<usize>;

    /// Attributes of `path` relative to `fd`
    fn path_filestat_get(&self, fd: Handle, flags: LookupFlags, path: &str)
        -> SandboxResult<FileStat>;

    /// Unlink a non-directory
    fn path_unlink_file(&self, fd: Handle, path: &str) -> SandboxResult<()>;

    /// Remove an empty directory
    fn path_remove_directory(&self, fd: Handle, path: &str) -> SandboxResult<()>;

    /// Set the access and modification times of `path`
    ///
    /// `atim`/`mtim` are only read when `fst_flags` carries `ATIM`/`MTIM`.
    fn path_filestat_set_times(
        &self,
        fd: Handle,
        flags: LookupFlags,
        path: &str,
        atim: u64,
        mtim: u64,
        fst_flags: FstFlags,
    ) -> SandboxResult<()>;

    /// Create a hard link `new_path` under `new_fd` to `old_path` under `old_fd`
    fn path_link(
        &self,
        old_fd: Handle,
        old_flags: LookupFlags,
        old_path: &str,
        new_fd: Handle,
        new_path: &str,
    ) -> SandboxResult<()>;

    /// Move `old_path` under `old_fd` to `new_path` under `new_fd`
    fn path_rename(
        &self,
        old_fd: Handle,
        old_path: &str,
        new_fd: Handle,
        new_path: &str,
    ) -> SandboxResult<()>;

    /// Move handle `from` to number `to`, closing whatever `to` held
    fn fd_renumber(&self, from: Handle, to: Handle) -> SandboxResult<()>;

    /// Block while `*word == expected`, atomically with respect to
    /// [`Sandbox::atomic_notify`]
    fn atomic_wait32(&self, word: &AtomicU32, expected: u32) -> SandboxResult<WaitOutcome>;

    /// Wake up to `count` threads blocked on `word`, returning how many woke
    fn atomic_notify(&self, word: &AtomicU32, count: u32) -> SandboxResult<u32>;

    /// Try to take a priority-inheriting lock on `word`
    fn futex_lock_pi(&self, word: &AtomicU32) -> SandboxResult<()>;

    /// Suspend the calling thread until `deadline` on `clock`
    fn clock_sleep(&self, clock: ClockId, deadline: SleepDeadline) -> SandboxResult<()>;

    /// Capture the current stack into `snapshot`
    ///
    /// Returns `0` when the snapshot was taken and the restore value when
    /// control comes back through [`Sandbox::stack_restore`].
    fn stack_checkpoint(&self, snapshot: &mut StackSnapshot) -> SandboxResult<u64>;

    /// Rewind to `snapshot`, making its checkpoint return `value`
    fn stack_restore(&self, snapshot: &StackSnapshot, value: u64) -> !;

    /// TLS block layout for new threads
    fn tls_layout(&self) -> TlsLayout;

    /// Copy the TLS initialisation image to `base`
    fn tls_init(&self, base: usize);
}
