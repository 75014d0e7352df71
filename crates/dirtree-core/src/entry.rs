//! Portable directory entry as produced by a filesystem backend
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::mode;

/// Opaque backend-specific object identifier
pub type Inode = u64;

/// Self-reference marker
pub const SELF_MARKER: &[u8] = b".";
/// Parent-reference marker
pub const PARENT_MARKER: &[u8] = b"..";

/// Status flags attached to an entry by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryStatus(u32);

impl EntryStatus {
    pub const NONE: EntryStatus = EntryStatus(0);
    /// Entry is marked as deleted in the directory structure
    pub const DELETED: EntryStatus = EntryStatus(0x01);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: EntryStatus) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: EntryStatus) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for EntryStatus {
    type Output = EntryStatus;

    fn bitor(self, rhs: EntryStatus) -> EntryStatus {
        EntryStatus(self.0 | rhs.0)
    }
}

/// Raw metadata recorded for an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStat {
    pub inode: Inode,
    /// Linux-layout `st_mode`
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Raw name bytes as stored on the medium
    pub name: Vec<u8>,
    pub stat: EntryStat,
    pub status: EntryStatus,
}

impl DirectoryEntry {
    pub fn new(name: impl Into<Vec<u8>>, stat: EntryStat) -> Self {
        Self {
            name: name.into(),
            stat,
            status: EntryStatus::NONE,
        }
    }

    /// Directory entry with `rwxr-xr-x` permissions
    pub fn directory(name: impl Into<Vec<u8>>, inode: Inode) -> Self {
        Self::new(
            name,
            EntryStat {
                inode,
                mode: mode::S_IFDIR | 0o755,
                ..Default::default()
            },
        )
    }

    /// Regular file entry with `rw-r--r--` permissions
    pub fn file(name: impl Into<Vec<u8>>, inode: Inode, size: u64) -> Self {
        Self::new(
            name,
            EntryStat {
                inode,
                mode: mode::S_IFREG | 0o644,
                size,
                ..Default::default()
            },
        )
    }

    pub fn with_status(mut self, status: EntryStatus) -> Self {
        self.status.insert(status);
        self
    }

    pub fn with_times(
        mut self,
        modified: Option<DateTime<Utc>>,
        accessed: Option<DateTime<Utc>>,
    ) -> Self {
        self.stat.modified = modified;
        self.stat.accessed = accessed;
        self
    }

    pub fn inode(&self) -> Inode {
        self.stat.inode
    }

    pub fn is_dir(&self) -> bool {
        mode::is_dir(self.stat.mode)
    }

    pub fn is_regular(&self) -> bool {
        mode::is_regular(self.stat.mode)
    }

    pub fn is_deleted(&self) -> bool {
        self.status.contains(EntryStatus::DELETED)
    }

    pub fn is_self_marker(&self) -> bool {
        self.name == SELF_MARKER
    }

    pub fn is_parent_marker(&self) -> bool {
        self.name == PARENT_MARKER
    }

    /// Name for display; invalid UTF-8 is shown with replacement characters
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        let entry = DirectoryEntry::file("a.txt", 12, 3).with_status(EntryStatus::DELETED);
        assert!(entry.is_deleted());
        assert!(!DirectoryEntry::file("b.txt", 13, 0).is_deleted());
        assert_eq!((EntryStatus::NONE | EntryStatus::DELETED).bits(), 1);
    }

    #[test]
    fn test_markers() {
        assert!(DirectoryEntry::directory(".", 2).is_self_marker());
        assert!(DirectoryEntry::directory("..", 2).is_parent_marker());
        assert!(!DirectoryEntry::directory("...", 2).is_parent_marker());
    }

    #[test]
    fn test_name_lossy() {
        let entry = DirectoryEntry::file(vec![b'a', 0xFF, b'b'], 20, 0);
        assert_eq!(entry.name_lossy(), "a\u{FFFD}b");
    }
}
