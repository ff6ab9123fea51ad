//! Error Code Translation (sandbox codes → POSIX errno)
//!
//! Complete mapping of the sandbox's structured error codes onto POSIX
//! `errno` values. The table is total: every code has an equivalent and codes
//! the table does not know fall back to [`UNKNOWN_ERRNO`].

use core::fmt;

use crate::kernel_interface::SandboxErrno;

/// POSIX errno codes (Linux/musl numbering)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Operation not permitted
    EPERM = 1,
    /// No such file or directory
    ENOENT = 2,
    /// No such process
    ESRCH = 3,
    /// Interrupted system call
    EINTR = 4,
    /// I/O error
    EIO = 5,
    /// No such device or address
    ENXIO = 6,
    /// Argument list too long
    E2BIG = 7,
    /// Exec format error
    ENOEXEC = 8,
    /// Bad file descriptor
    EBADF = 9,
    /// No child process
    ECHILD = 10,
    /// Resource temporarily unavailable
    EAGAIN = 11,
    /// Out of memory
    ENOMEM = 12,
    /// Permission denied
    EACCES = 13,
    /// Bad address
    EFAULT = 14,
    /// Resource busy
    EBUSY = 16,
    /// File exists
    EEXIST = 17,
    /// Cross-device link
    EXDEV = 18,
    /// No such device
    ENODEV = 19,
    /// Not a directory
    ENOTDIR = 20,
    /// Is a directory
    EISDIR = 21,
    /// Invalid argument
    EINVAL = 22,
    /// Too many open files in system
    ENFILE = 23,
    /// No file descriptors available
    EMFILE = 24,
    /// Not a tty
    ENOTTY = 25,
    /// Text file busy
    ETXTBSY = 26,
    /// File too large
    EFBIG = 27,
    /// No space left on device
    ENOSPC = 28,
    /// Invalid seek
    ESPIPE = 29,
    /// Read-only file system
    EROFS = 30,
    /// Too many links
    EMLINK = 31,
    /// Broken pipe
    EPIPE = 32,
    /// Domain error
    EDOM = 33,
    /// Result not representable
    ERANGE = 34,
    /// Resource deadlock would occur
    EDEADLK = 35,
    /// Filename too long
    ENAMETOOLONG = 36,
    /// No locks available
    ENOLCK = 37,
    /// Function not implemented
    ENOSYS = 38,
    /// Directory not empty
    ENOTEMPTY = 39,
    /// Symbolic link loop
    ELOOP = 40,
    /// No message of desired type
    ENOMSG = 42,
    /// Identifier removed
    EIDRM = 43,
    /// Link has been severed
    ENOLINK = 67,
    /// Protocol error
    EPROTO = 71,
    /// Multihop attempted
    EMULTIHOP = 72,
    /// Bad message
    EBADMSG = 74,
    /// Value too large for data type
    EOVERFLOW = 75,
    /// Illegal byte sequence
    EILSEQ = 84,
    /// Not a socket
    ENOTSOCK = 88,
    /// Destination address required
    EDESTADDRREQ = 89,
    /// Message too large
    EMSGSIZE = 90,
    /// Protocol wrong type for socket
    EPROTOTYPE = 91,
    /// Protocol not available
    ENOPROTOOPT = 92,
    /// Protocol not supported
    EPROTONOSUPPORT = 93,
    /// Not supported
    ENOTSUP = 95,
    /// Address family not supported by protocol
    EAFNOSUPPORT = 97,
    /// Address in use
    EADDRINUSE = 98,
    /// Address not available
    EADDRNOTAVAIL = 99,
    /// Network is down
    ENETDOWN = 100,
    /// Network unreachable
    ENETUNREACH = 101,
    /// Connection reset by network
    ENETRESET = 102,
    /// Connection aborted
    ECONNABORTED = 103,
    /// Connection reset by peer
    ECONNRESET = 104,
    /// No buffer space available
    ENOBUFS = 105,
    /// Socket is connected
    EISCONN = 106,
    /// Socket not connected
    ENOTCONN = 107,
    /// Operation timed out
    ETIMEDOUT = 110,
    /// Connection refused
    ECONNREFUSED = 111,
    /// Host is unreachable
    EHOSTUNREACH = 113,
    /// Operation already in progress
    EALREADY = 114,
    /// Operation in progress
    EINPROGRESS = 115,
    /// Stale file handle
    ESTALE = 116,
    /// Quota exceeded
    EDQUOT = 122,
    /// Operation canceled
    ECANCELED = 125,
    /// Previous owner died
    EOWNERDEAD = 130,
    /// State not recoverable
    ENOTRECOVERABLE = 131,
}

/// Errno reported for sandbox codes with no POSIX counterpart
pub const UNKNOWN_ERRNO: Errno = Errno::EIO;

impl Errno {
    /// `EOPNOTSUPP` shares its value with `ENOTSUP`
    pub const EOPNOTSUPP: Errno = Errno::ENOTSUP;
    /// `EWOULDBLOCK` shares its value with `EAGAIN`
    pub const EWOULDBLOCK: Errno = Errno::EAGAIN;

    /// Convert to i32 (for syscall return)
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Convert from i32
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::EPERM),
            2 => Some(Self::ENOENT),
            3 => Some(Self::ESRCH),
            4 => Some(Self::EINTR),
            5 => Some(Self::EIO),
            6 => Some(Self::ENXIO),
            7 => Some(Self::E2BIG),
            8 => Some(Self::ENOEXEC),
            9 => Some(Self::EBADF),
            10 => Some(Self::ECHILD),
            11 => Some(Self::EAGAIN),
            12 => Some(Self::ENOMEM),
            13 => Some(Self::EACCES),
            14 => Some(Self::EFAULT),
            16 => Some(Self::EBUSY),
            17 => Some(Self::EEXIST),
            18 => Some(Self::EXDEV),
            19 => Some(Self::ENODEV),
            20 => Some(Self::ENOTDIR),
            21 => Some(Self::EISDIR),
            22 => Some(Self::EINVAL),
            23 => Some(Self::ENFILE),
            24 => Some(Self::EMFILE),
            25 => Some(Self::ENOTTY),
            26 => Some(Self::ETXTBSY),
            27 => Some(Self::EFBIG),
            28 => Some(Self::ENOSPC),
            29 => Some(Self::ESPIPE),
            30 => Some(Self::EROFS),
            31 => Some(Self::EMLINK),
            32 => Some(Self::EPIPE),
            33 => Some(Self::EDOM),
            34 => Some(Self::ERANGE),
            35 => Some(Self::EDEADLK),
            36 => Some(Self::ENAMETOOLONG),
            37 => Some(Self::ENOLCK),
            38 => Some(Self::ENOSYS),
            39 => Some(Self::ENOTEMPTY),
            40 => Some(Self::ELOOP),
            42 => Some(Self::ENOMSG),
            43 => Some(Self::EIDRM),
            67 => Some(Self::ENOLINK),
            71 => Some(Self::EPROTO),
            72 => Some(Self::EMULTIHOP),
            74 => Some(Self::EBADMSG),
            75 => Some(Self::EOVERFLOW),
            84 => Some(Self::EILSEQ),
            88 => Some(Self::ENOTSOCK),
            89 => Some(Self::EDESTADDRREQ),
            90 => Some(Self::EMSGSIZE),
            91 => Some(Self::EPROTOTYPE),
            92 => Some(Self::ENOPROTOOPT),
            93 => Some(Self::EPROTONOSUPPORT),
            95 => Some(Self::ENOTSUP),
            97 => Some(Self::EAFNOSUPPORT),
            98 => Some(Self::EADDRINUSE),
            99 => Some(Self::EADDRNOTAVAIL),
            100 => Some(Self::ENETDOWN),
            101 => Some(Self::ENETUNREACH),
            102 => Some(Self::ENETRESET),
            103 => Some(Self::ECONNABORTED),
            104 => Some(Self::ECONNRESET),
            105 => Some(Self::ENOBUFS),
            106 => Some(Self::EISCONN),
            107 => Some(Self::ENOTCONN),
            110 => Some(Self::ETIMEDOUT),
            111 => Some(Self::ECONNREFUSED),
            113 => Some(Self::EHOSTUNREACH),
            114 => Some(Self::EALREADY),
            115 => Some(Self::EINPROGRESS),
            116 => Some(Self::ESTALE),
            122 => Some(Self::EDQUOT),
            125 => Some(Self::ECANCELED),
            130 => Some(Self::EOWNERDEAD),
            131 => Some(Self::ENOTRECOVERABLE),
            _ => None,
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(strerror(*self))
    }
}

/// Translate a sandbox error code
pub fn from_sandbox(code: SandboxErrno) -> Errno {
    match code {
        // A successful code is never an error; treat a stray one as unknown
        SandboxErrno::Success => UNKNOWN_ERRNO,
        SandboxErrno::TooBig => Errno::E2BIG,
        SandboxErrno::Access => Errno::EACCES,
        SandboxErrno::AddrInUse => Errno::EADDRINUSE,
        SandboxErrno::AddrNotAvail => Errno::EADDRNOTAVAIL,
        SandboxErrno::AfNoSupport => Errno::EAFNOSUPPORT,
        SandboxErrno::Again => Errno::EAGAIN,
        SandboxErrno::Already => Errno::EALREADY,
        SandboxErrno::BadF => Errno::EBADF,
        SandboxErrno::BadMsg => Errno::EBADMSG,
        SandboxErrno::Busy => Errno::EBUSY,
        SandboxErrno::Canceled => Errno::ECANCELED,
        SandboxErrno::Child => Errno::ECHILD,
        SandboxErrno::ConnAborted => Errno::ECONNABORTED,
        SandboxErrno::ConnRefused => Errno::ECONNREFUSED,
        SandboxErrno::ConnReset => Errno::ECONNRESET,
        SandboxErrno::Deadlk => Errno::EDEADLK,
        SandboxErrno::DestAddrReq => Errno::EDESTADDRREQ,
        SandboxErrno::Dom => Errno::EDOM,
        SandboxErrno::Dquot => Errno::EDQUOT,
        SandboxErrno::Exist => Errno::EEXIST,
        SandboxErrno::Fault => Errno::EFAULT,
        SandboxErrno::FBig => Errno::EFBIG,
        SandboxErrno::HostUnreach => Errno::EHOSTUNREACH,
        SandboxErrno::Idrm => Errno::EIDRM,
        SandboxErrno::Ilseq => Errno::EILSEQ,
        SandboxErrno::InProgress => Errno::EINPROGRESS,
        SandboxErrno::Intr => Errno::EINTR,
        SandboxErrno::Inval => Errno::EINVAL,
        SandboxErrno::Io => Errno::EIO,
        SandboxErrno::IsConn => Errno::EISCONN,
        SandboxErrno::IsDir => Errno::EISDIR,
        SandboxErrno::Loop => Errno::ELOOP,
        SandboxErrno::MFile => Errno::EMFILE,
        SandboxErrno::MLink => Errno::EMLINK,
        SandboxErrno::MsgSize => Errno::EMSGSIZE,
        SandboxErrno::Multihop => Errno::EMULTIHOP,
        SandboxErrno::NameTooLong => Errno::ENAMETOOLONG,
        SandboxErrno::NetDown => Errno::ENETDOWN,
        SandboxErrno::NetReset => Errno::ENETRESET,
        SandboxErrno::NetUnreach => Errno::ENETUNREACH,
        SandboxErrno::NFile => Errno::ENFILE,
        SandboxErrno::NoBufs => Errno::ENOBUFS,
        SandboxErrno::NoDev => Errno::ENODEV,
        SandboxErrno::NoEnt => Errno::ENOENT,
        SandboxErrno::NoExec => Errno::ENOEXEC,
        SandboxErrno::NoLck => Errno::ENOLCK,
        SandboxErrno::NoLink => Errno::ENOLINK,
        SandboxErrno::NoMem => Errno::ENOMEM,
        SandboxErrno::NoMsg => Errno::ENOMSG,
        SandboxErrno::NoProtoOpt => Errno::ENOPROTOOPT,
        SandboxErrno::NoSpc => Errno::ENOSPC,
        SandboxErrno::NoSys => Errno::ENOSYS,
        SandboxErrno::NotConn => Errno::ENOTCONN,
        SandboxErrno::NotDir => Errno::ENOTDIR,
        SandboxErrno::NotEmpty => Errno::ENOTEMPTY,
        SandboxErrno::NotRecoverable => Errno::ENOTRECOVERABLE,
        SandboxErrno::NotSock => Errno::ENOTSOCK,
        SandboxErrno::NotSup => Errno::ENOTSUP,
        SandboxErrno::NoTty => Errno::ENOTTY,
        SandboxErrno::Nxio => Errno::ENXIO,
        SandboxErrno::Overflow => Errno::EOVERFLOW,
        SandboxErrno::OwnerDead => Errno::EOWNERDEAD,
        SandboxErrno::Perm => Errno::EPERM,
        SandboxErrno::Pipe => Errno::EPIPE,
        SandboxErrno::Proto => Errno::EPROTO,
        SandboxErrno::ProtoNoSupport => Errno::EPROTONOSUPPORT,
        SandboxErrno::ProtoType => Errno::EPROTOTYPE,
        SandboxErrno::Range => Errno::ERANGE,
        SandboxErrno::Rofs => Errno::EROFS,
        SandboxErrno::Spipe => Errno::ESPIPE,
        SandboxErrno::Srch => Errno::ESRCH,
        SandboxErrno::Stale => Errno::ESTALE,
        SandboxErrno::TimedOut => Errno::ETIMEDOUT,
        SandboxErrno::TxtBsy => Errno::ETXTBSY,
        SandboxErrno::Xdev => Errno::EXDEV,
        SandboxErrno::NotCapable => Errno::EACCES,
        SandboxErrno::Shutdown => Errno::EPIPE,
        SandboxErrno::MemViolation => Errno::EFAULT,
        SandboxErrno::Unknown => UNKNOWN_ERRNO,
    }
}

/// Translate a raw wire code, including codes outside the table
pub fn from_raw_sandbox(raw: u16) -> Errno {
    match SandboxErrno::from_raw(raw) {
        Some(code) => from_sandbox(code),
        None => {
            log::warn!("[POSIX-WASIX] unknown sandbox error code {}", raw);
            UNKNOWN_ERRNO
        }
    }
}

impl From<SandboxErrno> for Errno {
    fn from(code: SandboxErrno) -> Self {
        from_sandbox(code)
    }
}

/// Get error string description
pub fn strerror(errno: Errno) -> &'static str {
    match errno {
        Errno::EPERM => "Operation not permitted",
        Errno::ENOENT => "No such file or directory",
        Errno::ESRCH => "No such process",
        Errno::EINTR => "Interrupted system call",
        Errno::EIO => "I/O error",
        Errno::ENXIO => "No such device or address",
        Errno::E2BIG => "Argument list too long",
        Errno::ENOEXEC => "Exec format error",
        Errno::EBADF => "Bad file descriptor",
        Errno::ECHILD => "No child process",
        Errno::EAGAIN => "Resource temporarily unavailable",
        Errno::ENOMEM => "Out of memory",
        Errno::EACCES => "Permission denied",
        Errno::EFAULT => "Bad address",
        Errno::EBUSY => "Resource busy",
        Errno::EEXIST => "File exists",
        Errno::EXDEV => "Cross-device link",
        Errno::ENODEV => "No such device",
        Errno::ENOTDIR => "Not a directory",
        Errno::EISDIR => "Is a directory",
        Errno::EINVAL => "Invalid argument",
        Errno::ENFILE => "Too many open files in system",
        Errno::EMFILE => "No file descriptors available",
        Errno::ENOTTY => "Not a tty",
        Errno::ETXTBSY => "Text file busy",
        Errno::EFBIG => "File too large",
        Errno::ENOSPC => "No space left on device",
        Errno::ESPIPE => "Invalid seek",
        Errno::EROFS => "Read-only file system",
        Errno::EMLINK => "Too many links",
        Errno::EPIPE => "Broken pipe",
        Errno::EDOM => "Domain error",
        Errno::ERANGE => "Result not representable",
        Errno::EDEADLK => "Resource deadlock would occur",
        Errno::ENAMETOOLONG => "Filename too long",
        Errno::ENOLCK => "No locks available",
        Errno::ENOSYS => "Function not implemented",
        Errno::ENOTEMPTY => "Directory not empty",
        Errno::ELOOP => "Symbolic link loop",
        Errno::ENOMSG => "No message of desired type",
        Errno::EIDRM => "Identifier removed",
        Errno::ENOLINK => "Link has been severed",
        Errno::EPROTO => "Protocol error",
        Errno::EMULTIHOP => "Multihop attempted",
        Errno::EBADMSG => "Bad message",
        Errno::EOVERFLOW => "Value too large for data type",
        Errno::EILSEQ => "Illegal byte sequence",
        Errno::ENOTSOCK => "Not a socket",
        Errno::EDESTADDRREQ => "Destination address required",
        Errno::EMSGSIZE => "Message too large",
        Errno::EPROTOTYPE => "Protocol wrong type for socket",
        Errno::ENOPROTOOPT => "Protocol not available",
        Errno::EPROTONOSUPPORT => "Protocol not supported",
        Errno::ENOTSUP => "Not supported",
        Errno::EAFNOSUPPORT => "Address family not supported by protocol",
        Errno::EADDRINUSE => "Address in use",
        Errno::EADDRNOTAVAIL => "Address not available",
        Errno::ENETDOWN => "Network is down",
        Errno::ENETUNREACH => "Network unreachable",
        Errno::ENETRESET => "Connection reset by network",
        Errno::ECONNABORTED => "Connection aborted",
        Errno::ECONNRESET => "Connection reset by peer",
        Errno::ENOBUFS => "No buffer space available",
        Errno::EISCONN => "Socket is connected",
        Errno::ENOTCONN => "Socket not connected",
        Errno::ETIMEDOUT => "Operation timed out",
        Errno::ECONNREFUSED => "Connection refused",
        Errno::EHOSTUNREACH => "Host is unreachable",
        Errno::EALREADY => "Operation already in progress",
        Errno::EINPROGRESS => "Operation in progress",
        Errno::ESTALE => "Stale file handle",
        Errno::EDQUOT => "Quota exceeded",
        Errno::ECANCELED => "Operation canceled",
        Errno::EOWNERDEAD => "Previous owner died",
        Errno::ENOTRECOVERABLE => "State not recoverable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sandbox_code_has_an_errno() {
        for raw in 0..=SandboxErrno::MAX_RAW {
            let errno = from_raw_sandbox(raw);
            assert!(Errno::from_i32(errno.as_i32()).is_some());
        }
    }

    #[test]
    fn test_unknown_codes_fall_back() {
        assert_eq!(from_raw_sandbox(SandboxErrno::MAX_RAW + 1), UNKNOWN_ERRNO);
        assert_eq!(from_raw_sandbox(u16::MAX), UNKNOWN_ERRNO);
        assert_eq!(from_sandbox(SandboxErrno::Unknown), UNKNOWN_ERRNO);
    }

    #[test]
    fn test_common_codes() {
        assert_eq!(from_sandbox(SandboxErrno::NoEnt), Errno::ENOENT);
        assert_eq!(from_sandbox(SandboxErrno::Access), Errno::EACCES);
        assert_eq!(from_sandbox(SandboxErrno::Inval), Errno::EINVAL);
        assert_eq!(from_sandbox(SandboxErrno::NotSup), Errno::ENOTSUP);
        assert_eq!(from_sandbox(SandboxErrno::IsDir), Errno::EISDIR);
        assert_eq!(from_sandbox(SandboxErrno::NotDir), Errno::ENOTDIR);
        assert_eq!(from_sandbox(SandboxErrno::Busy), Errno::EBUSY);
        assert_eq!(from_sandbox(SandboxErrno::NotCapable), Errno::EACCES);
    }

    #[test]
    fn test_errno_roundtrip_i32() {
        assert_eq!(Errno::from_i32(2), Some(Errno::ENOENT));
        assert_eq!(Errno::from_i32(95), Some(Errno::ENOTSUP));
        assert_eq!(Errno::from_i32(0), None);
        assert_eq!(Errno::from_i32(41), None);
        assert_eq!(Errno::EOPNOTSUPP, Errno::ENOTSUP);
    }

    #[test]
    fn test_strerror() {
        assert_eq!(strerror(Errno::EISDIR), "Is a directory");
        assert_eq!(alloc::format!("{}", Errno::ENOTDIR), "Not a directory");
    }
}
