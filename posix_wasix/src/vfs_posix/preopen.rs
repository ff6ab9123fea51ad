//! Pre-opened directory registry
//!
//! The sandbox has no root directory. Absolute-looking paths are mapped onto
//! the pre-opened handle whose prefix matches the most complete path
//! components, and the remainder becomes a lookup relative to that handle.
//!
//! The registry is append-only: entries are added at startup and live as long
//! as the runtime. Lookups take the read side of the lock only.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use spin::RwLock;

use crate::kernel_interface::{Handle, Prestat, Sandbox, SandboxErrno};
use crate::translation::{from_sandbox, Errno};

/// First descriptor the sandbox may hand out as a pre-open (after stdio)
const FIRST_PREOPEN_FD: u32 = 3;

/// A registered pre-opened directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreopenEntry {
    fd: Handle,
    prefix: String,
}

impl PreopenEntry {
    /// Handle of the pre-opened directory
    pub fn fd(&self) -> Handle {
        self.fd
    }

    /// Registered path prefix (owned copy)
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Strip `./` noise so that `.` and `./foo` behave like `` and `foo`
fn strip_dot_prefix(mut path: &str) -> &str {
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest.trim_start_matches('/');
        } else if path == "." {
            return "";
        } else {
            return path;
        }
    }
}

/// Does `prefix` name a leading run of complete components of `path`?
fn prefix_matches(prefix: &str, path: &str) -> bool {
    // An empty prefix stands for the directory relative paths start from
    if prefix.is_empty() {
        return !path.starts_with('/');
    }
    if !path.starts_with(prefix) {
        return false;
    }
    let end = prefix.trim_end_matches('/').len();
    matches!(path.as_bytes().get(end), None | Some(b'/'))
}

/// Process-wide table of pre-opened directories
pub struct PreopenRegistry {
    entries: RwLock<Vec<PreopenEntry>>,
    capacity: usize,
}

impl PreopenRegistry {
    /// Create an empty registry accepting at most `capacity` entries
    pub const fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Register `fd` under `prefix`
    ///
    /// The prefix is copied; the caller keeps ownership of its buffer.
    pub fn register(&self, fd: i32, prefix: &str) -> Result<(), Errno> {
        let fd = Handle::from_fd(fd)?;
        if prefix.contains('\0') {
            return Err(Errno::EINVAL);
        }

        let mut prefix = strip_dot_prefix(prefix);
        if prefix.len() > 1 {
            prefix = prefix.trim_end_matches('/');
            if prefix.is_empty() {
                prefix = "/";
            }
        }

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            log::warn!(
                "[POSIX-WASIX] preopen table full ({} entries), rejecting {}",
                self.capacity,
                fd
            );
            return Err(Errno::ENFILE);
        }
        entries.push(PreopenEntry {
            fd,
            prefix: String::from(prefix),
        });
        log::info!("[POSIX-WASIX] registered preopen {} as '{}'", fd, prefix);
        Ok(())
    }

    /// Register a handle the sandbox reported as pre-opened
    ///
    /// Handles past `i32::MAX` have no POSIX descriptor and give `EMFILE`.
    fn register_handle(&self, fd: Handle, prefix: &str) -> Result<(), Errno> {
        let posix_fd = fd.as_fd().map_err(|_| {
            log::warn!("[POSIX-WASIX] preopen {} has no descriptor number", fd);
            Errno::EMFILE
        })?;
        self.register(posix_fd, prefix)
    }

    /// Register every directory the sandbox pre-opened
    ///
    /// Walks descriptors upward from 3 until the sandbox reports `BadF`.
    pub fn populate<S: Sandbox + ?Sized>(&self, sandbox: &S) -> Result<usize, Errno> {
        let mut registered = 0;
        for raw in FIRST_PREOPEN_FD.. {
            let fd = Handle::from_raw(raw);
            let name_len = match sandbox.fd_prestat_get(fd) {
                Ok(Prestat::Dir { name_len }) => name_len,
                Err(SandboxErrno::BadF) => break,
                Err(code) => return Err(from_sandbox(code)),
            };

            let mut name = vec![0u8; name_len];
            sandbox
                .fd_prestat_dir_name(fd, &mut name)
                .map_err(from_sandbox)?;
            let name = core::str::from_utf8(&name).map_err(|_| Errno::EILSEQ)?;

            self.register_handle(fd, name)?;
            registered += 1;
        }
        Ok(registered)
    }

    /// Find the pre-open for `path` and the path relative to it
    ///
    /// The longest matching prefix wins; among equal prefixes the first
    /// registered one does. Matching is byte-exact and case-sensitive.
    pub fn find<'a>(&self, path: &'a str) -> Option<(Handle, &'a str)> {
        let path = strip_dot_prefix(path);
        let entries = self.entries.read();

        let mut best: Option<(Handle, usize)> = None;
        for entry in entries.iter() {
            let len = entry.prefix.len();
            if best.map_or(true, |(_, best_len)| len > best_len)
                && prefix_matches(&entry.prefix, path)
            {
                best = Some((entry.fd, len));
            }
        }

        let (fd, len) = best?;
        let relative = path[len..].trim_start_matches('/');
        Some((fd, if relative.is_empty() { "." } else { relative }))
    }

    /// Is `fd` registered under any prefix?
    pub fn contains(&self, fd: Handle) -> bool {
        self.entries.read().iter().any(|entry| entry.fd == fd)
    }

    /// Number of registered pre-opens
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of the registered entries
    pub fn entries(&self) -> Vec<PreopenEntry> {
        self.entries.read().clone()
    }
}
