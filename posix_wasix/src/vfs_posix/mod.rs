//! VFS layer of POSIX-WASIX
//!
//! Pre-open registry, path resolution and the path-based file operations.

pub mod file_ops;
pub mod namespace;
pub mod path_resolver;
pub mod preopen;

pub use path_resolver::{follow_flags, ResolvedPath};
pub use preopen::{PreopenEntry, PreopenRegistry};
