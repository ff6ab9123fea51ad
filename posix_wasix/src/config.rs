//! POSIX-WASIX Runtime Configuration
//!
//! Parameters of the compatibility layer, loaded from a command-line style
//! string such as `posix.max_preopens=16 posix.unlink_dir=eperm`.

use alloc::format;
use alloc::string::String;

use crate::translation::Errno;

/// Runtime configuration for POSIX-WASIX
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of pre-opened directories the registry accepts
    max_preopens: usize,

    /// Errno reported when `unlink` targets a directory
    unlink_dir_errno: Errno,
}

impl Config {
    /// Default registry capacity
    pub const DEFAULT_MAX_PREOPENS: usize = 64;

    /// Create default configuration
    pub const fn new() -> Self {
        Self {
            max_preopens: Self::DEFAULT_MAX_PREOPENS,
            unlink_dir_errno: Errno::EISDIR,
        }
    }

    /// Set maximum number of pre-opened directories
    pub fn with_max_preopens(mut self, max: usize) -> Self {
        self.max_preopens = max;
        self
    }

    /// Report `EPERM` instead of `EISDIR` when unlinking a directory
    pub fn with_strict_unlink(mut self, strict: bool) -> Self {
        self.unlink_dir_errno = if strict { Errno::EPERM } else { Errno::EISDIR };
        self
    }

    /// Get maximum number of pre-opened directories
    pub fn max_preopens(&self) -> usize {
        self.max_preopens
    }

    /// Get the errno for unlinking a directory
    pub fn unlink_dir_errno(&self) -> Errno {
        self.unlink_dir_errno
    }

    /// Load configuration from a command line
    ///
    /// Only `posix.*` tokens are consumed. Unknown `posix.*` keys are ignored,
    /// malformed values are `EINVAL`.
    pub fn from_cmdline(cmdline: &str) -> Result<Self, Errno> {
        let mut config = Self::new();

        for token in cmdline.split_whitespace() {
            let Some(setting) = token.strip_prefix("posix.") else {
                continue;
            };
            let (key, value) = setting.split_once('=').ok_or(Errno::EINVAL)?;

            match key {
                "max_preopens" => {
                    config.max_preopens = value.parse().map_err(|_| Errno::EINVAL)?;
                }
                "unlink_dir" => {
                    config.unlink_dir_errno = match value {
                        "eisdir" => Errno::EISDIR,
                        "eperm" => Errno::EPERM,
                        _ => return Err(Errno::EINVAL),
                    };
                }
                "strict" => {
                    let strict = match value {
                        "1" | "on" | "true" => true,
                        "0" | "off" | "false" => false,
                        _ => return Err(Errno::EINVAL),
                    };
                    config = config.with_strict_unlink(strict);
                }
                _ => log::debug!("[POSIX-WASIX] ignoring unknown option posix.{}", key),
            }
        }

        log::debug!("[POSIX-WASIX] configuration loaded: {}", config.export_config());
        Ok(config)
    }

    /// Export configuration as string
    pub fn export_config(&self) -> String {
        format!(
            "max_preopens={}, unlink_dir={}",
            self.max_preopens,
            match self.unlink_dir_errno {
                Errno::EPERM => "eperm",
                _ => "eisdir",
            }
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
