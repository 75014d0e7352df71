//! Error taxonomy of the directory engine
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::entry::Inode;

/// Conditions met while walking a directory tree
///
/// Only `Cancelled` ever escapes a walk; the others are reported where they
/// occur and curtail a single branch.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The backend returned nothing usable for this directory
    #[error("no file found in directory inode {inode}, filesystem seems damaged")]
    DamagedDirectory { inode: Inode },

    /// Appending a segment would exceed the virtual path capacity
    #[error("path too long: {len} bytes exceeds capacity of {capacity}")]
    PathTooLong { len: usize, capacity: usize },

    /// The recursion depth cap was reached
    #[error("subdirectory depth {depth} is too high")]
    DepthExceeded { depth: usize },

    /// The walk was cancelled by the user or a signal
    #[error("walk cancelled")]
    Cancelled,
}

/// Failure to bring a destination path into existence
#[derive(Debug, Error)]
pub enum LocalPathError {
    /// Both the literal and the sanitized name were refused
    #[error("host filesystem rejected {}: {source}", path.display())]
    NameRejected {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Creation failed for a reason unrelated to the name
    #[error("failed to create {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file cannot be created for an empty virtual path
    #[error("empty destination file name")]
    EmptyName,
}

/// Failure to copy a single regular file out of the volume
#[derive(Debug, Error)]
pub enum CopyError {
    /// The destination file could not be created
    #[error(transparent)]
    Destination(#[from] LocalPathError),

    /// The source data could not be read from the volume
    #[error("cannot read inode {inode}: {reason}")]
    Source { inode: Inode, reason: String },

    /// Writing the recovered data failed
    #[error("write error on {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
