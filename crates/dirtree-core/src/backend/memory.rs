//! In-memory directory graph
//!
//! Used to replay damaged layouts without an image: directories are plain
//! entry lists keyed by inode, so self-references and cycles are expressed
//! simply by pointing an entry at an inode higher up.

use anyhow::{anyhow, Result};
use std::collections::{HashMap, HashSet};
use std::io::Write;

use super::{CopyTarget, DirectoryBackend, ListRequest, DEFAULT_MIN_INODE};
use crate::entry::{DirectoryEntry, Inode};
use crate::error::CopyError;
use crate::local::restore_metadata;
use crate::walk::Capabilities;

#[derive(Debug, Clone)]
pub struct MemoryBackend {
    root: Inode,
    min_inode: Inode,
    capabilities: Capabilities,
    directories: HashMap<Inode, Vec<DirectoryEntry>>,
    data: HashMap<Inode, Vec<u8>>,
    failing: HashSet<Inode>,
    listed: Vec<Inode>,
}

impl MemoryBackend {
    pub fn new(root: Inode) -> Self {
        Self {
            root,
            min_inode: DEFAULT_MIN_INODE,
            capabilities: Capabilities::NONE,
            directories: HashMap::new(),
            data: HashMap::new(),
            failing: HashSet::new(),
            listed: Vec::new(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_min_inode(mut self, min_inode: Inode) -> Self {
        self.min_inode = min_inode;
        self
    }

    /// Register the entries of directory `inode`, replacing any previous list
    pub fn add_dir(&mut self, inode: Inode, entries: Vec<DirectoryEntry>) -> &mut Self {
        self.directories.insert(inode, entries);
        self
    }

    /// Content returned when the file `inode` is copied
    pub fn add_file_data(&mut self, inode: Inode, data: impl Into<Vec<u8>>) -> &mut Self {
        self.data.insert(inode, data.into());
        self
    }

    /// Make every copy of `inode` fail as unreadable
    pub fn fail_copy(&mut self, inode: Inode) -> &mut Self {
        self.failing.insert(inode);
        self
    }

    /// Inodes listed so far, in request order
    pub fn listed(&self) -> &[Inode] {
        &self.listed
    }
}

impl DirectoryBackend for MemoryBackend {
    fn list_directory(&mut self, request: &ListRequest<'_>, inode: Inode) -> Result<Vec<DirectoryEntry>> {
        self.listed.push(inode);
        let entries = self
            .directories
            .get(&inode)
            .ok_or_else(|| anyhow!("inode {} is not a known directory", inode))?;

        Ok(entries
            .iter()
            .filter(|entry| request.include_deleted || !entry.is_deleted())
            .cloned()
            .collect())
    }

    fn copy_file(&mut self, target: &CopyTarget<'_>, entry: &DirectoryEntry) -> Result<(), CopyError> {
        let inode = entry.inode();
        if self.failing.contains(&inode) {
            return Err(CopyError::Source {
                inode,
                reason: String::from("unreadable data block"),
            });
        }

        let (path, mut file) = target.create_file()?;
        let data = self.data.get(&inode).map(Vec::as_slice).unwrap_or_default();
        file.write_all(data)
            .and_then(|()| file.flush())
            .map_err(|source| CopyError::Write {
                path: path.clone(),
                source,
            })?;
        drop(file);

        restore_metadata(&path, &entry.stat);
        Ok(())
    }

    fn root_inode(&self) -> Inode {
        self.root
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn min_inode(&self) -> Inode {
        self.min_inode
    }

    fn describe(&self) -> String {
        format!("in-memory tree ({} directories)", self.directories.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryStatus;
    use crate::local::LocalPathBuilder;
    use crate::walk::VirtualPath;
    use tempfile::TempDir;

    fn backend() -> MemoryBackend {
        let mut backend = MemoryBackend::new(2);
        backend.add_dir(
            2,
            vec![
                DirectoryEntry::directory(".", 2),
                DirectoryEntry::file("kept.txt", 12, 5),
                DirectoryEntry::file("gone.txt", 13, 5).with_status(EntryStatus::DELETED),
            ],
        );
        backend.add_file_data(12, "hello");
        backend
    }

    #[test]
    fn test_deleted_entries_only_on_request() {
        let mut backend = backend();
        let path = VirtualPath::root();

        let request = ListRequest { path: &path, include_deleted: false };
        assert_eq!(backend.list_directory(&request, 2).unwrap().len(), 2);

        let request = ListRequest { path: &path, include_deleted: true };
        assert_eq!(backend.list_directory(&request, 2).unwrap().len(), 3);
        assert_eq!(backend.listed(), [2, 2]);
    }

    #[test]
    fn test_unknown_inode_is_an_error() {
        let mut backend = backend();
        let path = VirtualPath::root();
        let request = ListRequest { path: &path, include_deleted: false };
        assert!(backend.list_directory(&request, 99).is_err());
    }

    #[test]
    fn test_copy_writes_data() {
        let temp = TempDir::new().unwrap();
        let local = LocalPathBuilder::new(temp.path());
        let mut backend = backend();

        let mut path = VirtualPath::root();
        path.push(b"kept.txt").unwrap();
        let target = CopyTarget { path: &path, local: &local };
        backend.copy_file(&target, &DirectoryEntry::file("kept.txt", 12, 5)).unwrap();
        assert_eq!(std::fs::read(temp.path().join("kept.txt")).unwrap(), b"hello");

        backend.fail_copy(12);
        let err = backend
            .copy_file(&target, &DirectoryEntry::file("kept.txt", 12, 5))
            .unwrap_err();
        assert!(matches!(err, CopyError::Source { inode: 12, .. }));
    }
}
