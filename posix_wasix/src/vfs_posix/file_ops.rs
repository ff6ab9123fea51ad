//! File operations over resolved paths
//!
//! Each call resolves its path, issues one sandbox request and routes any
//! failure through the errno translator. Directory-shaped operations use the
//! directory fixups; nothing is retried.

use crate::compat::access::{R_OK, W_OK, X_OK};
use crate::compat::at_flags::{AT_EACCESS, AT_FDCWD, AT_REMOVEDIR, AT_SYMLINK_NOFOLLOW};
use crate::compat::{Timespec, UTIME_NOW, UTIME_OMIT};
use crate::kernel_interface::{FdRights, FileStat, FileType, FstFlags, Handle, LookupFlags, Sandbox};
use crate::translation::{fixup_directory, fixup_rmdir, fixup_unlink, from_sandbox, Errno};
use crate::Runtime;

use super::path_resolver::{follow_flags, ResolvedPath};

/// One `utimensat` timestamp as a sandbox value plus the flag selecting it
fn timestamp(ts: &Timespec, set: FstFlags, now: FstFlags) -> Result<(u64, FstFlags), Errno> {
    match ts.tv_nsec {
        UTIME_NOW => Ok((0, now)),
        UTIME_OMIT => Ok((0, FstFlags::empty())),
        _ => ts
            .to_timestamp()
            .map(|nanos| (nanos, set))
            .ok_or(Errno::EINVAL),
    }
}

impl<S: Sandbox> Runtime<S> {
    /// Attributes of a resolved path, with the directory fixup applied
    pub(crate) fn filestat(&self, resolved: &ResolvedPath<'_>) -> Result<FileStat, Errno> {
        self.sandbox()
            .path_filestat_get(resolved.base, resolved.flags.to_sandbox(), resolved.relative)
            .map_err(|code| fixup_directory(self.sandbox(), resolved.base, code))
    }

    /// `ENOTDIR` when a trailing slash names something that is not a directory
    fn check_trailing_slash(&self, resolved: &ResolvedPath<'_>) -> Result<(), Errno> {
        if resolved.flags.contains(LookupFlags::DIRECTORY)
            && self.filestat(resolved)?.filetype != FileType::Directory
        {
            return Err(Errno::ENOTDIR);
        }
        Ok(())
    }

    /// Read the target of the symlink at `path` relative to `fd`
    ///
    /// Copies at most `buf.len()` bytes, without a NUL terminator, and
    /// returns how many were written. Longer targets are truncated silently.
    pub fn readlinkat(&self, fd: i32, path: &str, buf: &mut [u8]) -> Result<usize, Errno> {
        if buf.is_empty() {
            return Err(Errno::EINVAL);
        }
        let resolved = self.resolve_at(fd, path, LookupFlags::empty())?;
        log::trace!(
            "[POSIX-WASIX] readlinkat({}, '{}', {})",
            resolved.base,
            resolved.relative,
            buf.len()
        );

        let used = self
            .sandbox()
            .path_readlink(resolved.base, resolved.relative, buf)
            .map_err(|code| fixup_directory(self.sandbox(), resolved.base, code))?;
        Ok(used.min(buf.len()))
    }

    /// `readlink` without a base descriptor
    pub fn readlink(&self, path: &str, buf: &mut [u8]) -> Result<usize, Errno> {
        self.readlinkat(AT_FDCWD, path, buf)
    }

    /// Remove a file, or a directory when `AT_REMOVEDIR` is set
    pub fn unlinkat(&self, fd: i32, path: &str, at_flags: i32) -> Result<(), Errno> {
        if at_flags & !AT_REMOVEDIR != 0 {
            return Err(Errno::EINVAL);
        }
        if at_flags & AT_REMOVEDIR != 0 {
            return self.rmdirat(fd, path);
        }

        let resolved = self.resolve_at(fd, path, LookupFlags::empty())?;
        log::trace!("[POSIX-WASIX] unlinkat({}, '{}')", resolved.base, resolved.relative);
        // a trailing slash names a directory, which unlink never removes
        if resolved.flags.contains(LookupFlags::DIRECTORY) {
            return Err(match self.filestat(&resolved)?.filetype {
                FileType::Directory => self.config().unlink_dir_errno(),
                _ => Errno::ENOTDIR,
            });
        }
        self.sandbox()
            .path_unlink_file(resolved.base, resolved.relative)
            .map_err(|code| {
                fixup_unlink(
                    self.sandbox(),
                    resolved.base,
                    resolved.relative,
                    code,
                    self.config().unlink_dir_errno(),
                )
            })
    }

    /// Remove the empty directory at `path` relative to `fd`
    pub fn rmdirat(&self, fd: i32, path: &str) -> Result<(), Errno> {
        let resolved = self.resolve_at(fd, path, LookupFlags::DIRECTORY)?;
        log::trace!("[POSIX-WASIX] rmdirat({}, '{}')", resolved.base, resolved.relative);
        self.sandbox()
            .path_remove_directory(resolved.base, resolved.relative)
            .map_err(|code| fixup_rmdir(self.sandbox(), resolved.base, resolved.relative, code))
    }

    /// Attributes of `path` relative to `fd`
    ///
    /// A trailing slash requires the target to be a directory and follows a
    /// final symlink even under `AT_SYMLINK_NOFOLLOW`.
    pub fn fstatat(&self, fd: i32, path: &str, at_flags: i32) -> Result<FileStat, Errno> {
        let resolved = self.resolve_at(fd, path, follow_flags(at_flags)?)?;
        let stat = self.filestat(&resolved)?;

        if resolved.flags.contains(LookupFlags::DIRECTORY) && stat.filetype != FileType::Directory {
            return Err(Errno::ENOTDIR);
        }
        Ok(stat)
    }

    /// Check that `path` exists and that `mode` access would be allowed
    ///
    /// Read and write access is judged by the rights the base directory
    /// hands down; the sandbox has no execute right, so `X_OK` only
    /// checks existence.
    pub fn faccessat(&self, fd: i32, path: &str, mode: i32, at_flags: i32) -> Result<(), Errno> {
        if at_flags & !(AT_EACCESS | AT_SYMLINK_NOFOLLOW) != 0 {
            return Err(Errno::EINVAL);
        }
        if mode & !(R_OK | W_OK | X_OK) != 0 {
            return Err(Errno::EINVAL);
        }
        let resolved = self.resolve_at(fd, path, follow_flags(at_flags)?)?;
        let stat = self.filestat(&resolved)?;
        let is_dir = stat.filetype == FileType::Directory;
        if resolved.flags.contains(LookupFlags::DIRECTORY) && !is_dir {
            return Err(Errno::ENOTDIR);
        }
        if mode & (R_OK | W_OK) == 0 {
            return Ok(());
        }

        let mut needed = FdRights::empty();
        if mode & R_OK != 0 {
            needed |= if is_dir { FdRights::FD_READDIR } else { FdRights::FD_READ };
        }
        if mode & W_OK != 0 {
            needed |= FdRights::FD_WRITE;
        }
        let base = self
            .sandbox()
            .fd_fdstat_get(resolved.base)
            .map_err(from_sandbox)?;
        if !base.rights_inheriting.contains(needed) {
            log::trace!(
                "[POSIX-WASIX] access '{}': {:?} not inherited from {}",
                path,
                needed - base.rights_inheriting,
                resolved.base
            );
            return Err(Errno::EACCES);
        }
        Ok(())
    }

    /// `faccessat` without a base descriptor
    pub fn access(&self, path: &str, mode: i32, at_flags: i32) -> Result<(), Errno> {
        self.faccessat(AT_FDCWD, path, mode, at_flags)
    }

    /// Set access and modification times of `path` relative to `fd`
    ///
    /// `None` sets both to now; a `tv_nsec` of `UTIME_NOW` or `UTIME_OMIT`
    /// sets that one to now or leaves it alone.
    pub fn utimensat(
        &self,
        fd: i32,
        path: &str,
        times: Option<&[Timespec; 2]>,
        at_flags: i32,
    ) -> Result<(), Errno> {
        let (atim, mtim, fst_flags) = match times {
            None => (0, 0, FstFlags::ATIM_NOW | FstFlags::MTIM_NOW),
            Some([atime, mtime]) => {
                let (atim, a) = timestamp(atime, FstFlags::ATIM, FstFlags::ATIM_NOW)?;
                let (mtim, m) = timestamp(mtime, FstFlags::MTIM, FstFlags::MTIM_NOW)?;
                (atim, mtim, a | m)
            }
        };
        let resolved = self.resolve_at(fd, path, follow_flags(at_flags)?)?;
        self.check_trailing_slash(&resolved)?;
        log::trace!(
            "[POSIX-WASIX] utimensat({}, '{}', {:?})",
            resolved.base,
            resolved.relative,
            fst_flags
        );
        self.sandbox()
            .path_filestat_set_times(
                resolved.base,
                resolved.flags.to_sandbox(),
                resolved.relative,
                atim,
                mtim,
                fst_flags,
            )
            .map_err(|code| fixup_directory(self.sandbox(), resolved.base, code))
    }

    /// `utimensat` without a base descriptor
    pub fn utimens(
        &self,
        path: &str,
        times: Option<&[Timespec; 2]>,
        at_flags: i32,
    ) -> Result<(), Errno> {
        self.utimensat(AT_FDCWD, path, times, at_flags)
    }

    /// Move descriptor `fd` to number `newfd`, closing what `newfd` held
    ///
    /// Registered pre-opens stay where they are: moving one, or replacing
    /// one, is `EBUSY`.
    pub fn fd_renumber(&self, fd: i32, newfd: i32) -> Result<(), Errno> {
        let from = Handle::from_fd(fd)?;
        let to = Handle::from_fd(newfd)?;
        if from == to {
            return self
                .sandbox()
                .fd_fdstat_get(from)
                .map(|_| ())
                .map_err(from_sandbox);
        }
        if self.preopens().contains(from) || self.preopens().contains(to) {
            log::debug!("[POSIX-WASIX] refusing to renumber pre-open {} -> {}", from, to);
            return Err(Errno::EBUSY);
        }
        log::trace!("[POSIX-WASIX] fd_renumber({} -> {})", from, to);
        self.sandbox().fd_renumber(from, to).map_err(from_sandbox)
    }

    /// Current offset of `fd`, like `lseek(fd, 0, SEEK_CUR)`
    pub fn tell(&self, fd: i32) -> Result<i64, Errno> {
        let offset = self
            .sandbox()
            .fd_tell(Handle::from_fd(fd)?)
            .map_err(from_sandbox)?;
        i64::try_from(offset).map_err(|_| Errno::EOVERFLOW)
    }
}
