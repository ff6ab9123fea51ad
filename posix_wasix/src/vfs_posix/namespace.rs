//! Two-path operations
//!
//! `link` and `rename` resolve their source and destination separately, so
//! the two may land under different pre-opens. The sandbox accepts a pair
//! of base handles and decides itself whether the move is possible.

use crate::compat::at_flags::{AT_FDCWD, AT_SYMLINK_FOLLOW};
use crate::kernel_interface::{FileType, LookupFlags, Sandbox};
use crate::translation::{fixup_directory, fixup_link, fixup_rename, Errno};
use crate::Runtime;

impl<S: Sandbox> Runtime<S> {
    /// Create `new_path` under `new_fd` as a hard link to `old_path` under
    /// `old_fd`
    ///
    /// A final symlink in `old_path` is linked itself unless
    /// `AT_SYMLINK_FOLLOW` is given.
    pub fn linkat(
        &self,
        old_fd: i32,
        old_path: &str,
        new_fd: i32,
        new_path: &str,
        at_flags: i32,
    ) -> Result<(), Errno> {
        if at_flags & !AT_SYMLINK_FOLLOW != 0 {
            return Err(Errno::EINVAL);
        }
        let follow = if at_flags & AT_SYMLINK_FOLLOW != 0 {
            LookupFlags::SYMLINK_FOLLOW
        } else {
            LookupFlags::empty()
        };
        let old = self.resolve_at(old_fd, old_path, follow)?;
        let new = self.resolve_at(new_fd, new_path, LookupFlags::empty())?;

        // a trailing slash on either side names a directory, and those
        // cannot be hard-linked
        let trailing_slash = (old.flags | new.flags).contains(LookupFlags::DIRECTORY);
        if trailing_slash {
            return Err(match self.filestat(&old)?.filetype {
                FileType::Directory => Errno::EPERM,
                _ => Errno::ENOTDIR,
            });
        }

        log::trace!(
            "[POSIX-WASIX] linkat({}, '{}' -> {}, '{}')",
            old.base,
            old.relative,
            new.base,
            new.relative
        );
        self.sandbox()
            .path_link(old.base, old.flags.to_sandbox(), old.relative, new.base, new.relative)
            .map_err(|code| fixup_link(self.sandbox(), old.base, old.relative, new.base, code))
    }

    /// `linkat` with both paths going through the pre-open registry
    pub fn link(&self, old_path: &str, new_path: &str, at_flags: i32) -> Result<(), Errno> {
        self.linkat(AT_FDCWD, old_path, AT_FDCWD, new_path, at_flags)
    }

    /// Move `old_path` under `old_fd` to `new_path` under `new_fd`
    ///
    /// An existing destination is replaced when it has the same kind as the
    /// source (and, for directories, is empty).
    pub fn renameat(
        &self,
        old_fd: i32,
        old_path: &str,
        new_fd: i32,
        new_path: &str,
    ) -> Result<(), Errno> {
        let old = self.resolve_at(old_fd, old_path, LookupFlags::empty())?;
        let new = self.resolve_at(new_fd, new_path, LookupFlags::empty())?;

        // rename moves a final symlink itself, so a trailing slash on either
        // side needs the source entry to be a real directory
        let trailing_slash = (old.flags | new.flags).contains(LookupFlags::DIRECTORY);
        if trailing_slash {
            let source = self
                .sandbox()
                .path_filestat_get(old.base, LookupFlags::empty(), old.relative)
                .map_err(|code| fixup_directory(self.sandbox(), old.base, code))?;
            if source.filetype != FileType::Directory {
                return Err(Errno::ENOTDIR);
            }
        }

        log::trace!(
            "[POSIX-WASIX] renameat({}, '{}' -> {}, '{}')",
            old.base,
            old.relative,
            new.base,
            new.relative
        );
        self.sandbox()
            .path_rename(old.base, old.relative, new.base, new.relative)
            .map_err(|code| {
                fixup_rename(
                    self.sandbox(),
                    old.base,
                    old.relative,
                    new.base,
                    new.relative,
                    code,
                )
            })
    }

    /// `renameat` with both paths going through the pre-open registry
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<(), Errno> {
        self.renameat(AT_FDCWD, old_path, AT_FDCWD, new_path)
    }
}
