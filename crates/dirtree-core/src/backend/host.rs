//! Directory trees already present on the host
//!
//! Lets the engine run over an extracted image or a mounted volume. Entries
//! are read with `symlink_metadata`, so links are listed but never followed.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use super::{CopyTarget, DirectoryBackend, ListRequest};
use crate::entry::{DirectoryEntry, EntryStat, Inode};
use crate::error::CopyError;
use crate::local::restore_metadata;
use crate::mode;

#[derive(Debug)]
pub struct HostBackend {
    root: PathBuf,
    root_inode: Inode,
    /// Host path of every inode seen so far
    paths: HashMap<Inode, PathBuf>,
    /// Inodes handed out on hosts without stable inode numbers
    #[cfg_attr(unix, allow(dead_code))]
    assigned: HashMap<PathBuf, Inode>,
    #[cfg_attr(unix, allow(dead_code))]
    next_inode: Inode,
}

impl HostBackend {
    /// Open the directory tree rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let meta = fs::metadata(root).with_context(|| format!("cannot read {}", root.display()))?;
        if !meta.is_dir() {
            bail!("{} is not a directory", root.display());
        }

        let mut backend = Self {
            root: root.to_path_buf(),
            root_inode: 0,
            paths: HashMap::new(),
            assigned: HashMap::new(),
            next_inode: 2,
        };
        backend.root_inode = backend.inode_of(root, &meta);
        backend.paths.insert(backend.root_inode, root.to_path_buf());
        Ok(backend)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[cfg(unix)]
    fn inode_of(&mut self, _path: &Path, meta: &Metadata) -> Inode {
        use std::os::unix::fs::MetadataExt;
        meta.ino()
    }

    #[cfg(not(unix))]
    fn inode_of(&mut self, path: &Path, _meta: &Metadata) -> Inode {
        if let Some(&inode) = self.assigned.get(path) {
            return inode;
        }
        let inode = self.next_inode;
        self.next_inode += 1;
        self.assigned.insert(path.to_path_buf(), inode);
        inode
    }

    fn stat_of(&mut self, path: &Path, meta: &Metadata) -> EntryStat {
        let (mode, uid, gid) = ownership(meta);
        EntryStat {
            inode: self.inode_of(path, meta),
            mode,
            uid,
            gid,
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
        }
    }

    /// Entry for `path` under `name`, remembering where its inode lives
    fn entry_for(&mut self, name: &[u8], path: &Path) -> io::Result<DirectoryEntry> {
        let meta = fs::symlink_metadata(path)?;
        let stat = self.stat_of(path, &meta);
        self.paths.entry(stat.inode).or_insert_with(|| path.to_path_buf());
        Ok(DirectoryEntry::new(name.to_vec(), stat))
    }
}

#[cfg(unix)]
fn ownership(meta: &Metadata) -> (u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode(), meta.uid(), meta.gid())
}

#[cfg(not(unix))]
fn ownership(meta: &Metadata) -> (u32, u32, u32) {
    let file_type = meta.file_type();
    let mode = if file_type.is_dir() {
        mode::S_IFDIR | 0o755
    } else if file_type.is_symlink() {
        mode::S_IFLNK | 0o777
    } else if meta.permissions().readonly() {
        mode::S_IFREG | 0o444
    } else {
        mode::S_IFREG | 0o644
    };
    (mode, 0, 0)
}

#[cfg(unix)]
fn name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn name_bytes(name: &std::ffi::OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

impl DirectoryBackend for HostBackend {
    fn list_directory(&mut self, _request: &ListRequest<'_>, inode: Inode) -> Result<Vec<DirectoryEntry>> {
        let Some(dir) = self.paths.get(&inode).cloned() else {
            bail!("inode {} has not been seen under {}", inode, self.root.display());
        };
        if !mode::is_dir(ownership(&fs::symlink_metadata(&dir)?).0) {
            bail!("{} is not a directory", dir.display());
        }

        let mut entries = Vec::new();
        entries.push(self.entry_for(b".", &dir)?);
        let parent = if dir == self.root {
            dir.clone()
        } else {
            dir.parent().map(Path::to_path_buf).unwrap_or_else(|| dir.clone())
        };
        entries.push(self.entry_for(b"..", &parent)?);

        let reader = fs::read_dir(&dir).with_context(|| format!("cannot list {}", dir.display()))?;
        for item in reader {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("Unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = item.path();
            match self.entry_for(&name_bytes(&item.file_name()), &path) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("Cannot stat {}: {}", path.display(), e),
            }
        }
        Ok(entries)
    }

    fn copy_file(&mut self, target: &CopyTarget<'_>, entry: &DirectoryEntry) -> Result<(), CopyError> {
        let inode = entry.inode();
        let source_path = self.paths.get(&inode).ok_or_else(|| CopyError::Source {
            inode,
            reason: String::from("inode has not been listed"),
        })?;
        let mut reader = File::open(source_path).map_err(|e| CopyError::Source {
            inode,
            reason: e.to_string(),
        })?;

        let (path, mut file) = target.create_file()?;
        if let Err(source) = io::copy(&mut reader, &mut file) {
            return Err(CopyError::Write { path, source });
        }
        drop(file);

        restore_metadata(&path, &entry.stat);
        Ok(())
    }

    fn root_inode(&self) -> Inode {
        self.root_inode
    }

    /// Host filesystems may use inode 1 for a real directory
    fn min_inode(&self) -> Inode {
        1
    }

    fn describe(&self) -> String {
        format!("host directory {}", self.root.display())
    }
}
