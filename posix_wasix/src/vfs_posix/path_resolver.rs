//! Path Resolution for POSIX-WASIX
//!
//! Turns a POSIX path, plus an optional base descriptor, into a lookup the
//! sandbox understands: a directory handle and a path relative to it.
//!
//! - `*at` calls with an explicit descriptor pass the path through unchanged
//! - `AT_FDCWD` and plain calls go through the pre-open registry, since there
//!   is no process working directory
//! - a trailing slash marks the target as directory-only

use crate::compat::at_flags::{AT_FDCWD, AT_SYMLINK_NOFOLLOW};
use crate::kernel_interface::{Handle, LookupFlags, Sandbox};
use crate::translation::Errno;
use crate::Runtime;

/// A path lookup ready for the sandbox
///
/// Derived per call; borrows the caller's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPath<'a> {
    pub base: Handle,
    pub relative: &'a str,
    pub flags: LookupFlags,
}

/// Lookup flags for an `*at` call accepting only `AT_SYMLINK_NOFOLLOW`
///
/// Symlinks are followed unless the caller opts out.
pub fn follow_flags(at_flags: i32) -> Result<LookupFlags, Errno> {
    if at_flags & !AT_SYMLINK_NOFOLLOW != 0 {
        return Err(Errno::EINVAL);
    }
    if at_flags & AT_SYMLINK_NOFOLLOW != 0 {
        Ok(LookupFlags::empty())
    } else {
        Ok(LookupFlags::SYMLINK_FOLLOW)
    }
}

/// Add `DIRECTORY` when the path names its target with a trailing slash
fn directory_hint(path: &str, flags: LookupFlags) -> LookupFlags {
    if path.len() > 1 && path.ends_with('/') {
        flags | LookupFlags::DIRECTORY
    } else {
        flags
    }
}

impl<S: Sandbox> Runtime<S> {
    /// Resolve `path` through the pre-open registry
    pub fn resolve<'a>(&self, path: &'a str, flags: LookupFlags) -> Result<ResolvedPath<'a>, Errno> {
        if path.is_empty() {
            return Err(Errno::ENOENT);
        }
        let (base, relative) = self.preopens().find(path).ok_or_else(|| {
            log::trace!("[POSIX-WASIX] no preopen covers '{}'", path);
            Errno::ENOENT
        })?;
        Ok(ResolvedPath {
            base,
            relative,
            flags: directory_hint(path, flags),
        })
    }

    /// Resolve `path` relative to `fd`, the `*at` convention
    pub fn resolve_at<'a>(
        &self,
        fd: i32,
        path: &'a str,
        flags: LookupFlags,
    ) -> Result<ResolvedPath<'a>, Errno> {
        if fd == AT_FDCWD {
            return self.resolve(path, flags);
        }
        if path.is_empty() {
            return Err(Errno::ENOENT);
        }
        Ok(ResolvedPath {
            base: Handle::from_fd(fd)?,
            relative: path,
            flags: directory_hint(path, flags),
        })
    }
}
