//! Destination tree construction on the host filesystem
//!
//! Recovered names are tried literally first. Only when the host refuses a
//! name because of its characters is the segment rewritten with
//! [`sanitize_segment`] and retried once. Deep paths are created one segment
//! at a time so every level gets the same treatment.

pub mod sanitize;

use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::entry::EntryStat;
use crate::error::LocalPathError;
use crate::mode;
pub use sanitize::{sanitize_segment, Ruleset};

/// Creation primitives of the host filesystem
pub trait HostFs: Send + Sync {
    /// Create a single directory; the parent must exist
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Create or truncate a file for writing
    fn create_file(&self, path: &Path) -> io::Result<File>;
}

/// `std::fs` backed host filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHostFs;

impl HostFs for StdHostFs {
    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o775);
        }
        builder.create(path)
    }

    fn create_file(&self, path: &Path) -> io::Result<File> {
        File::create(path)
    }
}

/// Whether the host refused a name because of the characters in it
pub fn is_name_rejection(err: &io::Error) -> bool {
    // EINVAL surfaces as InvalidInput on Unix
    if err.kind() == io::ErrorKind::InvalidInput {
        return true;
    }
    // ERROR_INVALID_NAME
    cfg!(windows) && err.raw_os_error() == Some(123)
}

#[cfg(unix)]
fn raw_host_name(segment: &[u8]) -> Option<OsString> {
    use std::os::unix::ffi::OsStrExt;
    Some(OsStr::from_bytes(segment).to_os_string())
}

#[cfg(not(unix))]
fn raw_host_name(segment: &[u8]) -> Option<OsString> {
    std::str::from_utf8(segment).ok().map(OsString::from)
}

/// Whether the host reads `name` as exactly one ordinary path component
fn is_single_component(name: &OsStr) -> bool {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(first)), None) => first == name,
        _ => false,
    }
}

/// Host representation of a name segment, if the bytes have one
///
/// `.`, `..` and anything the host would split or anchor (separators, drive
/// prefixes) have no literal representation.
fn host_name(segment: &[u8]) -> Option<OsString> {
    raw_host_name(segment).filter(|name| is_single_component(name))
}

fn host_name_lossy(segment: &[u8]) -> OsString {
    raw_host_name(segment).unwrap_or_else(|| OsString::from(String::from_utf8_lossy(segment).into_owned()))
}

/// Host name of the sanitized form of `segment`, joined below `parent`
fn sanitized_path(parent: &Path, segment: &[u8], ruleset: Ruleset) -> Result<PathBuf, LocalPathError> {
    let name = host_name_lossy(&sanitize_segment(segment, ruleset));
    let path = parent.join(&name);
    if !is_single_component(&name) {
        return Err(LocalPathError::NameRejected {
            path,
            source: io::Error::new(io::ErrorKind::InvalidInput, "name is not a single path component"),
        });
    }
    Ok(path)
}

fn segments(virtual_path: &[u8]) -> Vec<&[u8]> {
    virtual_path
        .split(|&b| b == b'/')
        .filter(|s| !s.is_empty())
        .collect()
}

fn create_dir_tolerant(fs: &dyn HostFs, path: &Path) -> io::Result<()> {
    match fs.create_dir(path) {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}

/// Builds destination paths under a local root
#[derive(Clone)]
pub struct LocalPathBuilder {
    root: PathBuf,
    ruleset: Ruleset,
    fs: Arc<dyn HostFs>,
}

impl std::fmt::Debug for LocalPathBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPathBuilder")
            .field("root", &self.root)
            .field("ruleset", &self.ruleset)
            .finish()
    }
}

impl LocalPathBuilder {
    /// Builder for the native ruleset and `std::fs`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ruleset: Ruleset::native(),
            fs: Arc::new(StdHostFs),
        }
    }

    pub fn with_ruleset(mut self, ruleset: Ruleset) -> Self {
        self.ruleset = ruleset;
        self
    }

    pub fn with_host_fs(mut self, fs: Arc<dyn HostFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ruleset(&self) -> Ruleset {
        self.ruleset
    }

    fn literal_path(&self, segments: &[&[u8]]) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for segment in segments {
            path.push(host_name(segment)?);
        }
        Some(path)
    }

    /// Create the directory mirroring `virtual_path` and return its host path
    ///
    /// The whole literal path is attempted first; on failure the path is
    /// rebuilt from the root one segment at a time.
    pub fn create_dir(&self, virtual_path: &[u8]) -> Result<PathBuf, LocalPathError> {
        let segments = segments(virtual_path);

        if let Some(path) = self.literal_path(&segments) {
            if create_dir_tolerant(self.fs.as_ref(), &path).is_ok() {
                return Ok(path);
            }
        }

        self.create_dir_segments(&segments)
    }

    fn create_dir_segments(&self, segments: &[&[u8]]) -> Result<PathBuf, LocalPathError> {
        let mut current = self.root.clone();
        for segment in segments {
            current = self.create_dir_segment(&current, segment)?;
        }
        Ok(current)
    }

    fn create_dir_segment(&self, parent: &Path, segment: &[u8]) -> Result<PathBuf, LocalPathError> {
        if let Some(name) = host_name(segment) {
            let path = parent.join(name);
            match create_dir_tolerant(self.fs.as_ref(), &path) {
                Ok(()) => return Ok(path),
                Err(e) if is_name_rejection(&e) => {
                    tracing::debug!("Name rejected for directory {}: {}", path.display(), e);
                }
                Err(source) => return Err(LocalPathError::Io { path, source }),
            }
        }

        let path = sanitized_path(parent, segment, self.ruleset)?;
        match create_dir_tolerant(self.fs.as_ref(), &path) {
            Ok(()) => Ok(path),
            Err(source) => Err(LocalPathError::NameRejected { path, source }),
        }
    }

    /// Create the file mirroring `virtual_path`, creating parents as needed
    pub fn create_file(&self, virtual_path: &[u8]) -> Result<(PathBuf, File), LocalPathError> {
        let segments = segments(virtual_path);
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(LocalPathError::EmptyName);
        };

        if let Some(path) = self.literal_path(&segments) {
            if let Ok(file) = self.fs.create_file(&path) {
                return Ok((path, file));
            }
        }

        let dir = self.create_dir_segments(parents)?;

        if let Some(name) = host_name(leaf) {
            let path = dir.join(name);
            match self.fs.create_file(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if is_name_rejection(&e) => {
                    tracing::debug!("Name rejected for file {}: {}", path.display(), e);
                }
                Err(source) => return Err(LocalPathError::Io { path, source }),
            }
        }

        let path = sanitized_path(&dir, leaf, self.ruleset)?;
        match self.fs.create_file(&path) {
            Ok(file) => Ok((path, file)),
            Err(source) => Err(LocalPathError::NameRejected { path, source }),
        }
    }
}

fn file_time(time: DateTime<Utc>) -> FileTime {
    FileTime::from_unix_time(time.timestamp(), time.timestamp_subsec_nanos())
}

/// Apply recorded access/modify times to a host path
///
/// A missing timestamp takes the value of the other one; when neither was
/// recorded the path is left alone.
pub fn set_times(
    path: &Path,
    accessed: Option<DateTime<Utc>>,
    modified: Option<DateTime<Utc>>,
) -> io::Result<()> {
    let (atime, mtime) = match (accessed, modified) {
        (None, None) => return Ok(()),
        (Some(a), None) => (a, a),
        (None, Some(m)) => (m, m),
        (Some(a), Some(m)) => (a, m),
    };
    filetime::set_file_times(path, file_time(atime), file_time(mtime))
}

/// Best-effort restore of times and permissions on a copied file
///
/// Returns false when any part could not be applied; failures are logged.
pub fn restore_metadata(path: &Path, stat: &EntryStat) -> bool {
    let mut ok = true;
    if let Err(e) = set_times(path, stat.accessed, stat.modified) {
        tracing::warn!("Couldn't set the file's date and time for {}: {}", path.display(), e);
        ok = false;
    }
    if let Err(e) = mode::set_mode(path, stat.mode) {
        tracing::warn!("Couldn't set the file's mode for {}: {}", path.display(), e);
        ok = false;
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::TempDir;

    /// Host filesystem refusing any name containing `*` or ending in a dot
    struct PickyFs;

    impl PickyFs {
        fn check(path: &Path) -> io::Result<()> {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if name.contains('*') || name.ends_with('.') {
                return Err(io::Error::from(io::ErrorKind::InvalidInput));
            }
            Ok(())
        }
    }

    impl HostFs for PickyFs {
        fn create_dir(&self, path: &Path) -> io::Result<()> {
            Self::check(path)?;
            StdHostFs.create_dir(path)
        }

        fn create_file(&self, path: &Path) -> io::Result<File> {
            Self::check(path)?;
            StdHostFs.create_file(path)
        }
    }

    fn picky(root: &Path) -> LocalPathBuilder {
        LocalPathBuilder::new(root)
            .with_ruleset(Ruleset::Windows)
            .with_host_fs(Arc::new(PickyFs))
    }

    #[test]
    fn test_literal_names_are_kept() {
        let temp = TempDir::new().unwrap();
        let builder = LocalPathBuilder::new(temp.path()).with_ruleset(Ruleset::Windows);

        let dir = builder.create_dir(b"/a/b/c").unwrap();
        assert_eq!(dir, temp.path().join("a").join("b").join("c"));
        assert!(dir.is_dir());

        // Existing directories are fine
        assert_eq!(builder.create_dir(b"/a/b/c").unwrap(), dir);
    }

    #[test]
    fn test_root_path_maps_to_root() {
        let temp = TempDir::new().unwrap();
        let builder = LocalPathBuilder::new(temp.path());
        assert_eq!(builder.create_dir(b"/").unwrap(), temp.path());
    }

    #[test]
    fn test_rejected_segment_is_sanitized() {
        let temp = TempDir::new().unwrap();
        let builder = picky(temp.path());

        let dir = builder.create_dir(b"/ok/bad*dir./inner").unwrap();
        assert_eq!(dir, temp.path().join("ok").join("bad_dir").join("inner"));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_file_creation_with_fallback() {
        let temp = TempDir::new().unwrap();
        let builder = picky(temp.path());

        let (path, mut file) = builder.create_file(b"/deep/er*/name*.txt").unwrap();
        file.write_all(b"data").unwrap();
        assert_eq!(path, temp.path().join("deep").join("er_").join("name_.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"data");

        let (plain, _) = builder.create_file(b"/deep/plain.txt").unwrap();
        assert_eq!(plain, temp.path().join("deep").join("plain.txt"));
    }

    #[test]
    fn test_dot_segments_stay_below_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("out");
        std::fs::create_dir(&root).unwrap();
        let builder = LocalPathBuilder::new(&root);

        let dir = builder.create_dir(b"/../up").unwrap();
        assert_eq!(dir, root.join("_").join("up"));

        let (path, _) = builder.create_file(b"/a/../../y").unwrap();
        assert_eq!(path, root.join("a").join("_").join("_").join("y"));

        let (here, _) = builder.create_file(b"/./x").unwrap();
        assert_eq!(here, root.join("_").join("x"));

        assert!(!temp.path().join("up").exists());
        assert!(!temp.path().join("y").exists());
    }

    #[test]
    fn test_single_component_names() {
        assert!(is_single_component(OsStr::new("name.txt")));
        assert!(is_single_component(OsStr::new("...")));
        assert!(!is_single_component(OsStr::new(".")));
        assert!(!is_single_component(OsStr::new("..")));
        assert!(!is_single_component(OsStr::new("a/b")));
        assert!(!is_single_component(OsStr::new("")));
        assert!(host_name(b"..").is_none());
    }

    #[test]
    fn test_empty_file_name() {
        let temp = TempDir::new().unwrap();
        let builder = LocalPathBuilder::new(temp.path());
        assert!(matches!(builder.create_file(b"/"), Err(LocalPathError::EmptyName)));
    }

    #[test]
    fn test_other_failures_are_not_sanitized() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("blocker"), b"").unwrap();
        let builder = picky(temp.path());

        let err = builder.create_file(b"/blocker/child.txt").unwrap_err();
        assert!(matches!(err, LocalPathError::Io { .. }), "{err}");
    }

    #[test]
    fn test_set_times() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"x").unwrap();

        let accessed = Utc.with_ymd_and_hms(2008, 3, 1, 12, 0, 0).unwrap();
        let modified = Utc.with_ymd_and_hms(2007, 1, 15, 8, 30, 0).unwrap();
        set_times(&path, Some(accessed), Some(modified)).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&meta).unix_seconds(),
            modified.timestamp()
        );
        assert_eq!(
            FileTime::from_last_access_time(&meta).unix_seconds(),
            accessed.timestamp()
        );
    }
}
