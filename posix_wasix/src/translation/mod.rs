//! Translation Module
//!
//! Converts sandbox results into POSIX errno values

pub mod errno;
pub mod fixup;

pub use errno::{from_raw_sandbox, from_sandbox, strerror, Errno, UNKNOWN_ERRNO};
pub use fixup::{
    fixup_directory, fixup_directory_pair, fixup_link, fixup_rename, fixup_rmdir, fixup_unlink,
};
