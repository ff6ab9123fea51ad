//! In-memory sandbox used by the unit tests
//!
//! Models a small directory tree behind pre-opened handles, a futex wait
//! queue keyed by word address, a counting priority-inheritance check and a
//! scripted checkpoint/restore pair. `stack_restore` unwinds with a
//! [`Restore`] payload that tests catch with `catch_unwind`.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use std::sync::{Condvar, Mutex};

use crate::kernel_interface::{
    ClockId, FdRights, FdStat, FileStat, FileType, FstFlags, Handle, LookupFlags, Prestat, Sandbox,
    SandboxErrno, SandboxResult, SleepDeadline, StackSnapshot, TlsLayout, WaitOutcome,
};

/// What the mock's clock reads whenever a timestamp is set to "now"
pub const MOCK_NOW: u64 = 1_700_000_000_000_000_000;

/// Payload carried by the unwind that stands in for a stack restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restore {
    pub user: u64,
    pub value: u64,
}

#[derive(Clone)]
enum Node {
    Dir(BTreeMap<String, Node>),
    File(Vec<u8>),
    Symlink(String),
}

impl Node {
    fn filetype(&self) -> FileType {
        match self {
            Node::Dir(_) => FileType::Directory,
            Node::File(_) => FileType::RegularFile,
            Node::Symlink(_) => FileType::SymbolicLink,
        }
    }

    fn size(&self) -> u64 {
        match self {
            Node::Dir(children) => children.len() as u64,
            Node::File(data) => data.len() as u64,
            Node::Symlink(target) => target.len() as u64,
        }
    }
}

struct HandleEntry {
    path: Vec<String>,
    preopen: Option<String>,
    offset: u64,
    inheriting: FdRights,
}

struct FsState {
    root: Node,
    handles: BTreeMap<u32, HandleEntry>,
    next_handle: u32,
    times: BTreeMap<Vec<String>, (u64, u64)>,
}

#[derive(Default)]
struct FutexState {
    waiting: BTreeMap<usize, usize>,
    pending: BTreeMap<usize, usize>,
}

pub struct MockSandbox {
    fs: Mutex<FsState>,
    futex: Mutex<FutexState>,
    futex_cv: Condvar,
    pi_checks: AtomicUsize,
    pi_result: Mutex<SandboxResult<()>>,
    resumes: Mutex<VecDeque<u64>>,
    next_snapshot: AtomicU64,
    tls_layout: Mutex<TlsLayout>,
    tls_inits: Mutex<Vec<usize>>,
    sleeps: Mutex<Vec<(ClockId, SleepDeadline)>>,
    sleep_result: Mutex<SandboxResult<()>>,
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".")
}

fn lookup<'a>(root: &'a Node, comps: &[String]) -> SandboxResult<&'a Node> {
    let mut node = root;
    for comp in comps {
        node = match node {
            Node::Dir(children) => children.get(comp).ok_or(SandboxErrno::NoEnt)?,
            _ => return Err(SandboxErrno::NotDir),
        };
    }
    Ok(node)
}

fn lookup_dir_mut<'a>(
    root: &'a mut Node,
    comps: &[String],
) -> SandboxResult<&'a mut BTreeMap<String, Node>> {
    let mut node = root;
    for comp in comps {
        node = match node {
            Node::Dir(children) => children.get_mut(comp).ok_or(SandboxErrno::NoEnt)?,
            _ => return Err(SandboxErrno::NotDir),
        };
    }
    match node {
        Node::Dir(children) => Ok(children),
        _ => Err(SandboxErrno::NotDir),
    }
}

impl FsState {
    /// Absolute components of `path` under directory handle `fd`
    fn resolve(&self, fd: Handle, path: &str) -> SandboxResult<Vec<String>> {
        let entry = self.handles.get(&fd.as_raw()).ok_or(SandboxErrno::BadF)?;
        if lookup(&self.root, &entry.path)?.filetype() != FileType::Directory {
            return Err(SandboxErrno::NotCapable);
        }
        if path.starts_with('/') {
            return Err(SandboxErrno::NotCapable);
        }
        let base = entry.path.len();
        let mut comps = entry.path.clone();
        for comp in split(path) {
            if comp == ".." {
                if comps.len() == base {
                    return Err(SandboxErrno::NotCapable);
                }
                comps.pop();
            } else {
                comps.push(comp.to_string());
            }
        }
        Ok(comps)
    }

    /// Components of the node `comps` names, following a final symlink when
    /// `flags` asks for it
    fn follow(&self, mut comps: Vec<String>, flags: LookupFlags) -> SandboxResult<Vec<String>> {
        let mut node = lookup(&self.root, &comps)?;
        let mut hops = 0;
        while let (Node::Symlink(target), true) =
            (node, flags.contains(LookupFlags::SYMLINK_FOLLOW))
        {
            hops += 1;
            if hops > 8 || target.starts_with('/') {
                return Err(SandboxErrno::Loop);
            }
            comps.pop();
            for comp in split(target) {
                if comp == ".." {
                    comps.pop();
                } else {
                    comps.push(comp.to_string());
                }
            }
            node = lookup(&self.root, &comps)?;
        }
        Ok(comps)
    }

    fn insert(&mut self, fd: Handle, path: &str, node: Node) {
        let mut comps = self.resolve(fd, path).unwrap();
        let name = comps.pop().unwrap();
        let dir = lookup_dir_mut(&mut self.root, &comps).unwrap();
        dir.insert(name, node);
    }

    fn new_handle(&mut self, path: Vec<String>, preopen: Option<String>) -> Handle {
        let raw = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(
            raw,
            HandleEntry {
                path,
                preopen,
                offset: 0,
                inheriting: FdRights::all(),
            },
        );
        Handle::from_raw(raw)
    }
}

impl MockSandbox {
    pub fn new() -> Self {
        Self {
            fs: Mutex::new(FsState {
                root: Node::Dir(BTreeMap::new()),
                handles: BTreeMap::new(),
                next_handle: 3,
                times: BTreeMap::new(),
            }),
            futex: Mutex::new(FutexState::default()),
            futex_cv: Condvar::new(),
            pi_checks: AtomicUsize::new(0),
            pi_result: Mutex::new(Ok(())),
            resumes: Mutex::new(VecDeque::new()),
            next_snapshot: AtomicU64::new(1),
            tls_layout: Mutex::new(TlsLayout {
                size: 64,
                align: 16,
            }),
            tls_inits: Mutex::new(Vec::new()),
            sleeps: Mutex::new(Vec::new()),
            sleep_result: Mutex::new(Ok(())),
        }
    }

    /// Create directory `name` and hand out a pre-opened handle for it
    pub fn add_preopen(&self, name: &str) -> Handle {
        let mut fs = self.fs.lock().unwrap();
        let comps: Vec<String> = split(name).map(String::from).collect();
        let mut node = &mut fs.root;
        for comp in &comps {
            node = match node {
                Node::Dir(children) => children
                    .entry(comp.clone())
                    .or_insert_with(|| Node::Dir(BTreeMap::new())),
                _ => panic!("preopen {} crosses a file", name),
            };
        }
        fs.new_handle(comps, Some(name.to_string()))
    }

    pub fn add_dir(&self, fd: Handle, path: &str) {
        self.fs
            .lock()
            .unwrap()
            .insert(fd, path, Node::Dir(BTreeMap::new()));
    }

    pub fn add_file(&self, fd: Handle, path: &str, data: &[u8]) {
        self.fs
            .lock()
            .unwrap()
            .insert(fd, path, Node::File(data.to_vec()));
    }

    pub fn add_symlink(&self, fd: Handle, path: &str, target: &str) {
        self.fs
            .lock()
            .unwrap()
            .insert(fd, path, Node::Symlink(target.to_string()));
    }

    /// Open a non-preopened handle on an existing node
    pub fn open_file_handle(&self, fd: Handle, path: &str) -> Handle {
        let mut fs = self.fs.lock().unwrap();
        let comps = fs.resolve(fd, path).unwrap();
        lookup(&fs.root, &comps).unwrap();
        fs.new_handle(comps, None)
    }

    pub fn exists(&self, fd: Handle, path: &str) -> bool {
        let fs = self.fs.lock().unwrap();
        fs.resolve(fd, path)
            .and_then(|comps| lookup(&fs.root, &comps).map(|_| ()))
            .is_ok()
    }

    pub fn set_offset(&self, fd: Handle, offset: u64) {
        let mut fs = self.fs.lock().unwrap();
        fs.handles.get_mut(&fd.as_raw()).unwrap().offset = offset;
    }

    /// Limit the rights `fd` passes on to what is opened through it
    pub fn set_inheriting_rights(&self, fd: Handle, rights: FdRights) {
        let mut fs = self.fs.lock().unwrap();
        fs.handles.get_mut(&fd.as_raw()).unwrap().inheriting = rights;
    }

    /// Contents of the regular file at `path`
    pub fn file_contents(&self, fd: Handle, path: &str) -> Option<Vec<u8>> {
        let fs = self.fs.lock().unwrap();
        let comps = fs.resolve(fd, path).ok()?;
        match lookup(&fs.root, &comps).ok()? {
            Node::File(data) => Some(data.clone()),
            _ => None,
        }
    }

    /// Is `raw` an open handle?
    pub fn is_open(&self, raw: u32) -> bool {
        self.fs.lock().unwrap().handles.contains_key(&raw)
    }

    pub fn set_pi_result(&self, result: SandboxResult<()>) {
        *self.pi_result.lock().unwrap() = result;
    }

    pub fn pi_check_count(&self) -> usize {
        self.pi_checks.load(Ordering::SeqCst)
    }

    /// Make the next checkpoint return `value`, as if restored into
    pub fn queue_resume(&self, value: u64) {
        self.resumes.lock().unwrap().push_back(value);
    }

    pub fn set_tls_layout(&self, layout: TlsLayout) {
        *self.tls_layout.lock().unwrap() = layout;
    }

    pub fn tls_inits(&self) -> Vec<usize> {
        self.tls_inits.lock().unwrap().clone()
    }

    pub fn sleeps(&self) -> Vec<(ClockId, SleepDeadline)> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn set_sleep_result(&self, result: SandboxResult<()>) {
        *self.sleep_result.lock().unwrap() = result;
    }

    /// Threads currently blocked on `word`
    pub fn waiters(&self, word: &AtomicU32) -> usize {
        let addr = word as *const AtomicU32 as usize;
        let futex = self.futex.lock().unwrap();
        let waiting = futex.waiting.get(&addr).copied().unwrap_or(0);
        let pending = futex.pending.get(&addr).copied().unwrap_or(0);
        waiting - pending
    }

    /// Spin until `n` threads are blocked on `word`
    pub fn wait_for_waiters(&self, word: &AtomicU32, n: usize) {
        while self.waiters(word) < n {
            std::thread::yield_now();
        }
    }
}

impl Sandbox for MockSandbox {
    fn fd_prestat_get(&self, fd: Handle) -> SandboxResult<Prestat> {
        let fs = self.fs.lock().unwrap();
        match fs.handles.get(&fd.as_raw()).and_then(|e| e.preopen.as_ref()) {
            Some(name) => Ok(Prestat::Dir {
                name_len: name.len(),
            }),
            None => Err(SandboxErrno::BadF),
        }
    }

    fn fd_prestat_dir_name(&self, fd: Handle, buf: &mut [u8]) -> SandboxResult<()> {
        let fs = self.fs.lock().unwrap();
        let name = fs
            .handles
            .get(&fd.as_raw())
            .and_then(|e| e.preopen.as_ref())
            .ok_or(SandboxErrno::BadF)?;
        if buf.len() < name.len() {
            return Err(SandboxErrno::NameTooLong);
        }
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Ok(())
    }

    fn fd_fdstat_get(&self, fd: Handle) -> SandboxResult<FdStat> {
        let fs = self.fs.lock().unwrap();
        let entry = fs.handles.get(&fd.as_raw()).ok_or(SandboxErrno::BadF)?;
        let node = lookup(&fs.root, &entry.path)?;
        Ok(FdStat {
            filetype: node.filetype(),
            rights_base: FdRights::all(),
            rights_inheriting: entry.inheriting,
            ..FdStat::default()
        })
    }

    fn fd_tell(&self, fd: Handle) -> SandboxResult<u64> {
        let fs = self.fs.lock().unwrap();
        let entry = fs.handles.get(&fd.as_raw()).ok_or(SandboxErrno::BadF)?;
        if lookup(&fs.root, &entry.path)?.filetype() == FileType::Directory {
            return Err(SandboxErrno::NotCapable);
        }
        Ok(entry.offset)
    }

    fn path_readlink(&self, fd: Handle, path: &str, buf: &mut [u8]) -> SandboxResult<usize> {
        let fs = self.fs.lock().unwrap();
        let comps = fs.resolve(fd, path)?;
        match lookup(&fs.root, &comps)? {
            Node::Symlink(target) => {
                let n = target.len().min(buf.len());
                buf[..n].copy_from_slice(&target.as_bytes()[..n]);
                // report the full length, like runtimes that do not clamp
                Ok(target.len())
            }
            _ => Err(SandboxErrno::Inval),
        }
    }

    fn path_filestat_get(
        &self,
        fd: Handle,
        flags: LookupFlags,
        path: &str,
    ) -> SandboxResult<FileStat> {
        let fs = self.fs.lock().unwrap();
        let comps = fs.follow(fs.resolve(fd, path)?, flags)?;
        let node = lookup(&fs.root, &comps)?;
        let (atim, mtim) = fs.times.get(&comps).copied().unwrap_or_default();
        Ok(FileStat {
            filetype: node.filetype(),
            nlink: 1,
            size: node.size(),
            atim,
            mtim,
            ..FileStat::default()
        })
    }

    fn path_unlink_file(&self, fd: Handle, path: &str) -> SandboxResult<()> {
        let mut fs = self.fs.lock().unwrap();
        let mut comps = fs.resolve(fd, path)?;
        if matches!(lookup(&fs.root, &comps)?, Node::Dir(_)) {
            return Err(SandboxErrno::Perm);
        }
        let name = comps.pop().ok_or(SandboxErrno::NotCapable)?;
        lookup_dir_mut(&mut fs.root, &comps)?.remove(&name);
        Ok(())
    }

    fn path_remove_directory(&self, fd: Handle, path: &str) -> SandboxResult<()> {
        let mut fs = self.fs.lock().unwrap();
        let mut comps = fs.resolve(fd, path)?;
        match lookup(&fs.root, &comps)? {
            Node::Dir(children) if !children.is_empty() => return Err(SandboxErrno::NotEmpty),
            Node::Dir(_) => {}
            _ => return Err(SandboxErrno::NotCapable),
        }
        let name = comps.pop().ok_or(SandboxErrno::NotCapable)?;
        lookup_dir_mut(&mut fs.root, &comps)?.remove(&name);
        Ok(())
    }

    fn path_filestat_set_times(
        &self,
        fd: Handle,
        flags: LookupFlags,
        path: &str,
        atim: u64,
        mtim: u64,
        fst_flags: FstFlags,
    ) -> SandboxResult<()> {
        let mut fs = self.fs.lock().unwrap();
        let comps = fs.follow(fs.resolve(fd, path)?, flags)?;
        let times = fs.times.entry(comps).or_default();
        if fst_flags.contains(FstFlags::ATIM) {
            times.0 = atim;
        } else if fst_flags.contains(FstFlags::ATIM_NOW) {
            times.0 = MOCK_NOW;
        }
        if fst_flags.contains(FstFlags::MTIM) {
            times.1 = mtim;
        } else if fst_flags.contains(FstFlags::MTIM_NOW) {
            times.1 = MOCK_NOW;
        }
        Ok(())
    }

    fn path_link(
        &self,
        old_fd: Handle,
        old_flags: LookupFlags,
        old_path: &str,
        new_fd: Handle,
        new_path: &str,
    ) -> SandboxResult<()> {
        let mut fs = self.fs.lock().unwrap();
        let source = fs.follow(fs.resolve(old_fd, old_path)?, old_flags)?;
        let node = lookup(&fs.root, &source)?.clone();
        if matches!(node, Node::Dir(_)) {
            return Err(SandboxErrno::Perm);
        }
        let mut target = fs.resolve(new_fd, new_path)?;
        let name = target.pop().ok_or(SandboxErrno::NotCapable)?;
        let dir = lookup_dir_mut(&mut fs.root, &target)?;
        if dir.contains_key(&name) {
            return Err(SandboxErrno::Exist);
        }
        dir.insert(name, node);
        Ok(())
    }

    fn path_rename(
        &self,
        old_fd: Handle,
        old_path: &str,
        new_fd: Handle,
        new_path: &str,
    ) -> SandboxResult<()> {
        let mut fs = self.fs.lock().unwrap();
        let mut source = fs.resolve(old_fd, old_path)?;
        let mut target = fs.resolve(new_fd, new_path)?;
        let source_is_dir = matches!(lookup(&fs.root, &source)?, Node::Dir(_));
        if source_is_dir && target.len() > source.len() && target.starts_with(&source) {
            return Err(SandboxErrno::Inval);
        }
        match lookup(&fs.root, &target) {
            Ok(Node::Dir(_)) if !source_is_dir => return Err(SandboxErrno::Perm),
            Ok(Node::Dir(children)) if !children.is_empty() && source != target => {
                return Err(SandboxErrno::NotEmpty)
            }
            Ok(Node::Dir(_)) => {}
            Ok(_) if source_is_dir => return Err(SandboxErrno::Perm),
            Ok(_) | Err(SandboxErrno::NoEnt) => {}
            Err(code) => return Err(code),
        }
        if source == target {
            return Ok(());
        }

        let source_name = source.pop().ok_or(SandboxErrno::NotCapable)?;
        let target_name = target.pop().ok_or(SandboxErrno::NotCapable)?;
        lookup_dir_mut(&mut fs.root, &target)?;
        let node = lookup_dir_mut(&mut fs.root, &source)?
            .remove(&source_name)
            .ok_or(SandboxErrno::NoEnt)?;
        lookup_dir_mut(&mut fs.root, &target)?.insert(target_name, node);
        Ok(())
    }

    fn fd_renumber(&self, from: Handle, to: Handle) -> SandboxResult<()> {
        let mut fs = self.fs.lock().unwrap();
        let entry = fs.handles.remove(&from.as_raw()).ok_or(SandboxErrno::BadF)?;
        fs.handles.insert(to.as_raw(), entry);
        Ok(())
    }

    fn atomic_wait32(&self, word: &AtomicU32, expected: u32) -> SandboxResult<WaitOutcome> {
        let addr = word as *const AtomicU32 as usize;
        let mut futex = self.futex.lock().unwrap();
        if word.load(Ordering::SeqCst) != expected {
            return Ok(WaitOutcome::NotEqual);
        }
        *futex.waiting.entry(addr).or_insert(0) += 1;
        loop {
            futex = self.futex_cv.wait(futex).unwrap();
            let state = &mut *futex;
            if let Some(pending) = state.pending.get_mut(&addr).filter(|p| **p > 0) {
                *pending -= 1;
                if let Some(waiting) = state.waiting.get_mut(&addr) {
                    *waiting -= 1;
                }
                return Ok(WaitOutcome::Woken);
            }
        }
    }

    fn atomic_notify(&self, word: &AtomicU32, count: u32) -> SandboxResult<u32> {
        let addr = word as *const AtomicU32 as usize;
        let mut futex = self.futex.lock().unwrap();
        let waiting = futex.waiting.get(&addr).copied().unwrap_or(0);
        let pending = futex.pending.entry(addr).or_insert(0);
        let woken = (waiting - *pending).min(count as usize);
        *pending += woken;
        drop(futex);
        self.futex_cv.notify_all();
        Ok(woken as u32)
    }

    fn futex_lock_pi(&self, word: &AtomicU32) -> SandboxResult<()> {
        self.pi_checks.fetch_add(1, Ordering::SeqCst);
        // widen the race window for concurrent first use
        std::thread::sleep(std::time::Duration::from_millis(5));
        let result = *self.pi_result.lock().unwrap();
        if result.is_ok() {
            word.store(1, Ordering::SeqCst);
        }
        result
    }

    fn clock_sleep(&self, clock: ClockId, deadline: SleepDeadline) -> SandboxResult<()> {
        self.sleeps.lock().unwrap().push((clock, deadline));
        *self.sleep_result.lock().unwrap()
    }

    fn stack_checkpoint(&self, snapshot: &mut StackSnapshot) -> SandboxResult<u64> {
        if let Some(value) = self.resumes.lock().unwrap().pop_front() {
            return Ok(value);
        }
        snapshot.user = self.next_snapshot.fetch_add(1, Ordering::SeqCst);
        snapshot.hash = [snapshot.user.rotate_left(17), !snapshot.user];
        Ok(0)
    }

    fn stack_restore(&self, snapshot: &StackSnapshot, value: u64) -> ! {
        std::panic::panic_any(Restore {
            user: snapshot.user,
            value,
        })
    }

    fn tls_layout(&self) -> TlsLayout {
        *self.tls_layout.lock().unwrap()
    }

    fn tls_init(&self, base: usize) {
        self.tls_inits.lock().unwrap().push(base);
    }
}
