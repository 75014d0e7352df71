//! Filesystem backends feeding the directory engine
//!
//! A backend knows how to read one on-disk format. The engine only ever asks
//! it two things: the entries of a directory identified by inode, and to copy
//! one regular file out to a destination the engine has prepared.

mod host;
mod memory;

pub use host::HostBackend;
pub use memory::MemoryBackend;

use anyhow::Result;

use crate::entry::{DirectoryEntry, Inode};
use crate::error::CopyError;
use crate::local::LocalPathBuilder;
use crate::walk::{Capabilities, VirtualPath};

/// Smallest inode a backend accepts as a directory by default
pub const DEFAULT_MIN_INODE: Inode = 2;

/// Arguments of a directory listing request
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
    /// Virtual path of the directory being listed
    pub path: &'a VirtualPath,
    /// Whether entries flagged as deleted should be returned
    pub include_deleted: bool,
}

/// Destination of a single file copy
#[derive(Debug, Clone, Copy)]
pub struct CopyTarget<'a> {
    /// Virtual path of the file, including its own name
    pub path: &'a VirtualPath,
    /// Builder for the local mirror
    pub local: &'a LocalPathBuilder,
}

impl CopyTarget<'_> {
    /// Create the destination file for this target
    pub fn create_file(&self) -> Result<(std::path::PathBuf, std::fs::File), CopyError> {
        Ok(self.local.create_file(self.path.as_bytes())?)
    }
}

/// Directory-reading capability of one filesystem format
pub trait DirectoryBackend {
    /// Entries of the directory `inode`
    ///
    /// An empty vector or an error both mean the directory could not be read;
    /// the engine logs it and carries on with the rest of the tree.
    fn list_directory(&mut self, request: &ListRequest<'_>, inode: Inode) -> Result<Vec<DirectoryEntry>>;

    /// Copy the regular file `entry` to `target`
    fn copy_file(&mut self, target: &CopyTarget<'_>, entry: &DirectoryEntry) -> Result<(), CopyError>;

    /// Inode of the root directory
    fn root_inode(&self) -> Inode;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Inodes below this value are reserved and never entered
    fn min_inode(&self) -> Inode {
        DEFAULT_MIN_INODE
    }

    /// Short description used in log headers
    fn describe(&self) -> String {
        String::from("unknown filesystem")
    }
}
