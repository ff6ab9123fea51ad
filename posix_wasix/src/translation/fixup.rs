//! Directory fixups
//!
//! Some sandbox calls fail with a generic code when the real problem is that
//! the target is, or is not, a directory. These helpers consult the sandbox
//! once more after the failure and pick the directory-specific errno. They are
//! only applied by operations whose target is directory-shaped; everything
//! else goes through [`from_sandbox`] unchanged.

use crate::kernel_interface::{FileType, Handle, LookupFlags, Sandbox, SandboxErrno};

use super::errno::{from_sandbox, Errno};

/// Codes the sandbox uses when it refuses a path operation without saying why
fn is_generic_refusal(code: SandboxErrno) -> bool {
    matches!(
        code,
        SandboxErrno::NotCapable | SandboxErrno::Perm | SandboxErrno::Access
    )
}

/// Type of `path` under `fd`, without following a final symlink
fn lookup_type<S: Sandbox + ?Sized>(sandbox: &S, fd: Handle, path: &str) -> Option<FileType> {
    sandbox
        .path_filestat_get(fd, LookupFlags::empty(), path)
        .ok()
        .map(|stat| stat.filetype)
}

/// Translate a failure of an operation whose base `fd` must be a directory
///
/// `NotCapable` on a base handle that is not a directory becomes `ENOTDIR`.
pub fn fixup_directory<S: Sandbox + ?Sized>(sandbox: &S, fd: Handle, code: SandboxErrno) -> Errno {
    if code == SandboxErrno::NotCapable {
        if let Ok(stat) = sandbox.fd_fdstat_get(fd) {
            if stat.filetype != FileType::Directory {
                log::trace!("[POSIX-WASIX] {} is not a directory, NOTCAPABLE -> ENOTDIR", fd);
                return Errno::ENOTDIR;
            }
        }
    }
    from_sandbox(code)
}

/// Translate a failed `path_unlink_file`
///
/// Unlinking a directory is reported as `is_dir_errno` (`EISDIR` on Linux,
/// `EPERM` under strict POSIX) whatever generic code the sandbox chose.
pub fn fixup_unlink<S: Sandbox + ?Sized>(
    sandbox: &S,
    fd: Handle,
    path: &str,
    code: SandboxErrno,
    is_dir_errno: Errno,
) -> Errno {
    if (is_generic_refusal(code) || code == SandboxErrno::IsDir)
        && lookup_type(sandbox, fd, path) == Some(FileType::Directory)
    {
        return is_dir_errno;
    }
    fixup_directory(sandbox, fd, code)
}

/// Translate a failed `path_remove_directory`
///
/// Removing something that exists but is not a directory is `ENOTDIR`.
pub fn fixup_rmdir<S: Sandbox + ?Sized>(
    sandbox: &S,
    fd: Handle,
    path: &str,
    code: SandboxErrno,
) -> Errno {
    if is_generic_refusal(code) {
        if let Some(filetype) = lookup_type(sandbox, fd, path) {
            if filetype != FileType::Directory {
                return Errno::ENOTDIR;
            }
        }
    }
    fixup_directory(sandbox, fd, code)
}

/// [`fixup_directory`] for calls with two base handles
///
/// The first base that is not a directory decides.
pub fn fixup_directory_pair<S: Sandbox + ?Sized>(
    sandbox: &S,
    old_fd: Handle,
    new_fd: Handle,
    code: SandboxErrno,
) -> Errno {
    match fixup_directory(sandbox, old_fd, code) {
        Errno::ENOTDIR => Errno::ENOTDIR,
        _ => fixup_directory(sandbox, new_fd, code),
    }
}

/// Translate a failed `path_link`
///
/// Directories cannot be hard-linked; a generic refusal on one is `EPERM`.
pub fn fixup_link<S: Sandbox + ?Sized>(
    sandbox: &S,
    old_fd: Handle,
    old_path: &str,
    new_fd: Handle,
    code: SandboxErrno,
) -> Errno {
    if is_generic_refusal(code)
        && lookup_type(sandbox, old_fd, old_path) == Some(FileType::Directory)
    {
        return Errno::EPERM;
    }
    fixup_directory_pair(sandbox, old_fd, new_fd, code)
}

/// Translate a failed `path_rename`
///
/// Replacing a non-directory with a directory is `ENOTDIR`, the reverse is
/// `EISDIR`.
pub fn fixup_rename<S: Sandbox + ?Sized>(
    sandbox: &S,
    old_fd: Handle,
    old_path: &str,
    new_fd: Handle,
    new_path: &str,
    code: SandboxErrno,
) -> Errno {
    if is_generic_refusal(code) {
        let source = lookup_type(sandbox, old_fd, old_path);
        let target = lookup_type(sandbox, new_fd, new_path);
        match (source, target) {
            (Some(FileType::Directory), Some(t)) if t != FileType::Directory => {
                return Errno::ENOTDIR
            }
            (Some(s), Some(FileType::Directory)) if s != FileType::Directory => {
                return Errno::EISDIR
            }
            _ => {}
        }
    }
    fixup_directory_pair(sandbox, old_fd, new_fd, code)
}
