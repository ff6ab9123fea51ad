//! Mutex attributes
//!
//! `pthread_mutexattr_*` state as closed enums. Raw values that do not name
//! a supported setting are rejected before anything is stored.
//!
//! Priority inheritance depends on host support, which is checked once per
//! runtime by trying a priority-inheriting lock on a throwaway word. The
//! outcome, success or errno, is remembered in a [`spin::Once`] so concurrent
//! first callers race on a single slot and the check runs exactly once.

use core::sync::atomic::AtomicU32;

use spin::Once;

use crate::compat::pthread::{
    PTHREAD_MUTEX_ERRORCHECK, PTHREAD_MUTEX_NORMAL, PTHREAD_MUTEX_RECURSIVE, PTHREAD_PRIO_INHERIT,
    PTHREAD_PRIO_NONE, PTHREAD_PRIO_PROTECT, PTHREAD_PROCESS_PRIVATE, PTHREAD_PROCESS_SHARED,
};
use crate::kernel_interface::Sandbox;
use crate::translation::{from_sandbox, Errno};
use crate::Runtime;

/// Mutex priority protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutexProtocol {
    #[default]
    None,
    /// Owner inherits the priority of the highest-priority waiter
    Inherit,
}

impl MutexProtocol {
    /// POSIX constant for this protocol
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::None => PTHREAD_PRIO_NONE,
            Self::Inherit => PTHREAD_PRIO_INHERIT,
        }
    }
}

/// Mutex type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutexKind {
    /// Relocking deadlocks; unlock is not checked
    #[default]
    Normal,
    /// The owner may relock; each lock needs an unlock
    Recursive,
    /// Relock and foreign unlock are reported as errors
    ErrorCheck,
}

impl MutexKind {
    /// Decode a `PTHREAD_MUTEX_*` constant
    pub fn from_raw(raw: i32) -> Result<Self, Errno> {
        match raw {
            PTHREAD_MUTEX_NORMAL => Ok(Self::Normal),
            PTHREAD_MUTEX_RECURSIVE => Ok(Self::Recursive),
            PTHREAD_MUTEX_ERRORCHECK => Ok(Self::ErrorCheck),
            _ => Err(Errno::EINVAL),
        }
    }

    /// POSIX constant for this type
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Normal => PTHREAD_MUTEX_NORMAL,
            Self::Recursive => PTHREAD_MUTEX_RECURSIVE,
            Self::ErrorCheck => PTHREAD_MUTEX_ERRORCHECK,
        }
    }
}

/// Memoised priority-inheritance support
pub struct PiSupport {
    result: Once<Result<(), Errno>>,
}

impl PiSupport {
    /// Create an empty slot
    pub const fn new() -> Self {
        Self { result: Once::new() }
    }

    /// Check support on first use, then return the remembered outcome
    pub fn check<S: Sandbox + ?Sized>(&self, sandbox: &S) -> Result<(), Errno> {
        *self.result.call_once(|| {
            let scratch = AtomicU32::new(0);
            let outcome = sandbox.futex_lock_pi(&scratch).map_err(from_sandbox);
            match outcome {
                Ok(()) => log::debug!("[POSIX-WASIX] priority inheritance supported"),
                Err(errno) => log::debug!("[POSIX-WASIX] priority inheritance unavailable: {}", errno),
            }
            outcome
        })
    }

    /// Outcome of the check, if it has run
    pub fn cached(&self) -> Option<Result<(), Errno>> {
        self.result.get().copied()
    }
}

impl Default for PiSupport {
    fn default() -> Self {
        Self::new()
    }
}

/// `pthread_mutexattr_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutexAttr {
    protocol: MutexProtocol,
    kind: MutexKind,
    process_shared: bool,
}

impl MutexAttr {
    /// Default attributes: normal, private, no priority protocol
    pub const fn new() -> Self {
        Self {
            protocol: MutexProtocol::None,
            kind: MutexKind::Normal,
            process_shared: false,
        }
    }

    pub fn protocol(&self) -> MutexProtocol {
        self.protocol
    }

    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    pub fn is_process_shared(&self) -> bool {
        self.process_shared
    }

    /// `pthread_mutexattr_setprotocol`
    ///
    /// `PTHREAD_PRIO_INHERIT` consults `support` and keeps the attribute
    /// unchanged when the host cannot honour it.
    pub fn set_protocol<S: Sandbox + ?Sized>(
        &mut self,
        raw: i32,
        support: &PiSupport,
        sandbox: &S,
    ) -> Result<(), Errno> {
        self.protocol = match raw {
            PTHREAD_PRIO_NONE => MutexProtocol::None,
            PTHREAD_PRIO_INHERIT => {
                support.check(sandbox)?;
                MutexProtocol::Inherit
            }
            PTHREAD_PRIO_PROTECT => return Err(Errno::ENOTSUP),
            _ => return Err(Errno::EINVAL),
        };
        Ok(())
    }

    /// `pthread_mutexattr_settype`
    pub fn set_kind(&mut self, raw: i32) -> Result<(), Errno> {
        self.kind = MutexKind::from_raw(raw)?;
        Ok(())
    }

    /// `pthread_mutexattr_setpshared`
    pub fn set_pshared(&mut self, raw: i32) -> Result<(), Errno> {
        self.process_shared = match raw {
            PTHREAD_PROCESS_PRIVATE => false,
            PTHREAD_PROCESS_SHARED => true,
            _ => return Err(Errno::EINVAL),
        };
        Ok(())
    }
}

impl<S: Sandbox> Runtime<S> {
    /// Set the priority protocol of `attr`, probing the host on first use
    /// of `PTHREAD_PRIO_INHERIT`
    pub fn mutexattr_setprotocol(&self, attr: &mut MutexAttr, raw: i32) -> Result<(), Errno> {
        attr.set_protocol(raw, self.pi_support(), self.sandbox())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_interface::SandboxErrno;
    use crate::testing::MockSandbox;
    use crate::Config;
    use proptest::prelude::*;
    use std::sync::Barrier;
    use std::thread;

    fn runtime() -> Runtime<MockSandbox> {
        Runtime::new(MockSandbox::new(), Config::default())
    }

    #[test]
    fn test_unknown_protocol_leaves_attr_unchanged() {
        let rt = runtime();
        let mut attr = MutexAttr::new();
        rt.mutexattr_setprotocol(&mut attr, PTHREAD_PRIO_INHERIT).unwrap();

        assert_eq!(rt.mutexattr_setprotocol(&mut attr, 99), Err(Errno::EINVAL));
        assert_eq!(attr.protocol(), MutexProtocol::Inherit);
    }

    #[test]
    fn test_protect_is_unsupported() {
        let rt = runtime();
        let mut attr = MutexAttr::new();
        assert_eq!(
            rt.mutexattr_setprotocol(&mut attr, PTHREAD_PRIO_PROTECT),
            Err(Errno::ENOTSUP)
        );
        assert_eq!(attr, MutexAttr::new());
        assert_eq!(rt.sandbox().pi_check_count(), 0);
    }

    #[test]
    fn test_none_clears_inherit_without_probing_again() {
        let rt = runtime();
        let mut attr = MutexAttr::new();
        rt.mutexattr_setprotocol(&mut attr, PTHREAD_PRIO_INHERIT).unwrap();
        rt.mutexattr_setprotocol(&mut attr, PTHREAD_PRIO_NONE).unwrap();
        assert_eq!(attr.protocol(), MutexProtocol::None);
        rt.mutexattr_setprotocol(&mut attr, PTHREAD_PRIO_INHERIT).unwrap();
        assert_eq!(attr.protocol().as_raw(), PTHREAD_PRIO_INHERIT);
        assert_eq!(rt.sandbox().pi_check_count(), 1);
    }

    #[test]
    fn test_pi_failure_is_remembered() {
        let sb = MockSandbox::new();
        sb.set_pi_result(Err(SandboxErrno::NotSup));
        let rt = Runtime::new(sb, Config::default());

        let mut attr = MutexAttr::new();
        for _ in 0..3 {
            assert_eq!(
                rt.mutexattr_setprotocol(&mut attr, PTHREAD_PRIO_INHERIT),
                Err(Errno::ENOTSUP)
            );
        }
        assert_eq!(attr.protocol(), MutexProtocol::None);
        assert_eq!(rt.sandbox().pi_check_count(), 1);
        assert_eq!(rt.pi_support().cached(), Some(Err(Errno::ENOTSUP)));
    }

    #[test]
    fn test_concurrent_first_use_checks_once() {
        const THREADS: usize = 8;
        let rt = runtime();
        let barrier = Barrier::new(THREADS);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    let mut attr = MutexAttr::new();
                    barrier.wait();
                    rt.mutexattr_setprotocol(&mut attr, PTHREAD_PRIO_INHERIT)
                        .unwrap();
                    assert_eq!(attr.protocol(), MutexProtocol::Inherit);
                });
            }
        });

        assert_eq!(rt.sandbox().pi_check_count(), 1);
        assert_eq!(rt.pi_support().cached(), Some(Ok(())));
    }

    #[test]
    fn test_kind_and_pshared() {
        let mut attr = MutexAttr::new();
        attr.set_kind(PTHREAD_MUTEX_RECURSIVE).unwrap();
        assert_eq!(attr.kind(), MutexKind::Recursive);
        assert_eq!(attr.set_kind(7), Err(Errno::EINVAL));
        assert_eq!(attr.kind(), MutexKind::Recursive);

        attr.set_pshared(PTHREAD_PROCESS_SHARED).unwrap();
        assert!(attr.is_process_shared());
        assert_eq!(attr.set_pshared(2), Err(Errno::EINVAL));
        assert!(attr.is_process_shared());
    }

    proptest! {
        #[test]
        fn prop_setprotocol_is_idempotent(raw in -4i32..8) {
            let rt = runtime();
            let mut once = MutexAttr::new();
            let mut twice = MutexAttr::new();

            let first = rt.mutexattr_setprotocol(&mut once, raw);
            rt.mutexattr_setprotocol(&mut twice, raw).ok();
            let second = rt.mutexattr_setprotocol(&mut twice, raw);

            prop_assert_eq!(first, second);
            prop_assert_eq!(once, twice);
            prop_assert!(rt.sandbox().pi_check_count() <= 1);
        }
    }
}
