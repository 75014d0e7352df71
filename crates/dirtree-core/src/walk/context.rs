//! Traversal state shared by every frame of a walk
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::listing::{format_entry_line, ListingSink, TracingSink};
use super::path::VirtualPath;
use crate::backend::{DirectoryBackend, ListRequest};
use crate::entry::{DirectoryEntry, Inode};
use crate::error::WalkError;
use crate::local::LocalPathBuilder;
use crate::ordering::sort_entries;

/// Maximum recursion depth of a walk or an export
pub const MAX_DEPTH: usize = 256;

/// Optional features a backend supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    /// Deleted entries can be listed
    pub const LIST_DELETED: Capabilities = Capabilities(0x01);

    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

/// Runtime options of a walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkOptions {
    /// Prefix every log line with the directory's virtual path
    pub show_full_path: bool,
    /// List deleted entries, when the backend can
    pub include_deleted: bool,
    /// Above zero, every visited inode is logged
    pub verbosity: u8,
}

impl WalkOptions {
    pub fn with_full_path(mut self, enabled: bool) -> Self {
        self.show_full_path = enabled;
        self
    }

    pub fn with_deleted(mut self, enabled: bool) -> Self {
        self.include_deleted = enabled;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }
}

/// Cancellation request shared with a signal handler or another thread
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The shared atomic, for registering with a signal handler
    pub fn handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Inodes entered on the current path, indexed by depth
///
/// Entering depth `d` discards everything recorded below it, so finished
/// sibling subtrees never block a later branch.
#[derive(Debug, Clone, Default)]
pub struct AncestorStack {
    inodes: Vec<Inode>,
}

impl AncestorStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, depth: usize, inode: Inode) {
        self.inodes.truncate(depth);
        self.inodes.push(inode);
    }

    /// Whether `inode` was entered at any depth in `0..=depth`
    pub fn is_ancestor(&self, depth: usize, inode: Inode) -> bool {
        self.inodes.iter().take(depth + 1).any(|&known| known == inode)
    }

    pub fn as_slice(&self) -> &[Inode] {
        &self.inodes
    }
}

/// Mutable state threaded through a walk
pub struct WalkContext<B> {
    pub(crate) backend: B,
    pub(crate) path: VirtualPath,
    pub(crate) options: WalkOptions,
    pub(crate) capabilities: Capabilities,
    pub(crate) destination: Option<LocalPathBuilder>,
    pub(crate) ancestors: AncestorStack,
    pub(crate) cancel: CancelFlag,
    pub(crate) sink: Box<dyn ListingSink>,
}

impl<B: DirectoryBackend> WalkContext<B> {
    pub fn new(backend: B) -> Self {
        let capabilities = backend.capabilities();
        Self {
            backend,
            path: VirtualPath::root(),
            options: WalkOptions::default(),
            capabilities,
            destination: None,
            ancestors: AncestorStack::new(),
            cancel: CancelFlag::new(),
            sink: Box::new(TracingSink),
        }
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ListingSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_destination(mut self, destination: LocalPathBuilder) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start from a virtual path other than the root
    pub fn with_path(mut self, path: VirtualPath) -> Self {
        self.path = path;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn path(&self) -> &VirtualPath {
        &self.path
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn destination(&self) -> Option<&LocalPathBuilder> {
        self.destination.as_ref()
    }

    pub fn set_destination(&mut self, destination: LocalPathBuilder) {
        self.destination = Some(destination);
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn ancestors(&self) -> &AncestorStack {
        &self.ancestors
    }

    /// Deleted entries are listed only when requested and supported
    pub fn include_deleted(&self) -> bool {
        self.options.include_deleted && self.capabilities.contains(Capabilities::LIST_DELETED)
    }

    /// Flip the include-deleted option; false when the backend cannot list them
    pub fn toggle_deleted(&mut self) -> bool {
        if !self.capabilities.contains(Capabilities::LIST_DELETED) {
            return false;
        }
        self.options.include_deleted = !self.options.include_deleted;
        true
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), WalkError> {
        if self.cancel.is_cancelled() {
            Err(WalkError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Append `segment` to the virtual path for the lifetime of the guard
    pub fn enter(&mut self, segment: &[u8]) -> Result<PathGuard<'_, B>, WalkError> {
        let restore_len = self.path.push(segment)?;
        Ok(PathGuard {
            ctx: self,
            restore_len,
        })
    }

    /// Entries of `inode` in presentation order, without logging them
    pub(crate) fn fetch_entries(&mut self, inode: Inode) -> Vec<DirectoryEntry> {
        let include_deleted = self.include_deleted();
        let request = ListRequest {
            path: &self.path,
            include_deleted,
        };

        let mut entries = match self.backend.list_directory(&request, inode) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Listing of {} (inode {}) failed: {:#}", self.path, inode, e);
                Vec::new()
            }
        };
        if !include_deleted {
            entries.retain(|entry| !entry.is_deleted());
        }
        if entries.is_empty() {
            tracing::warn!("{} ({})", WalkError::DamagedDirectory { inode }, self.path);
        }

        sort_entries(&mut entries);
        entries
    }

    /// Entries of `inode`, also written to the forensic log
    pub(crate) fn list_entries(&mut self, inode: Inode) -> Vec<DirectoryEntry> {
        let entries = self.fetch_entries(inode);

        self.sink.directory(&self.path);
        let prefix = self.options.show_full_path.then_some(&self.path);
        for entry in &entries {
            self.sink.entry(&format_entry_line(entry, prefix));
        }
        entries
    }
}

/// Scoped path segment; dropping it restores the previous virtual path
pub struct PathGuard<'c, B> {
    ctx: &'c mut WalkContext<B>,
    restore_len: usize,
}

impl<B> Deref for PathGuard<'_, B> {
    type Target = WalkContext<B>;

    fn deref(&self) -> &WalkContext<B> {
        self.ctx
    }
}

impl<B> DerefMut for PathGuard<'_, B> {
    fn deref_mut(&mut self) -> &mut WalkContext<B> {
        self.ctx
    }
}

impl<B> Drop for PathGuard<'_, B> {
    fn drop(&mut self) {
        self.ctx.path.truncate(self.restore_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    #[test]
    fn test_ancestor_stack_forgets_finished_branches() {
        let mut stack = AncestorStack::new();
        stack.enter(0, 2);
        stack.enter(1, 10);
        stack.enter(2, 20);
        assert!(stack.is_ancestor(2, 10));

        // Back at depth 1, a sibling of 10 is entered
        stack.enter(1, 11);
        assert!(!stack.is_ancestor(1, 10));
        assert!(!stack.is_ancestor(1, 20));
        assert!(stack.is_ancestor(1, 2));
        assert_eq!(stack.as_slice(), [2, 11]);
    }

    #[test]
    fn test_ancestor_check_is_bounded_by_depth() {
        let mut stack = AncestorStack::new();
        stack.enter(0, 2);
        stack.enter(1, 10);
        stack.enter(2, 20);
        // Checking from depth 1 ignores whatever was recorded deeper
        assert!(!stack.is_ancestor(1, 20));
    }

    #[test]
    fn test_guard_restores_path() {
        let mut ctx = WalkContext::new(MemoryBackend::new(2));
        {
            let mut outer = ctx.enter(b"a").unwrap();
            assert_eq!(outer.path().as_bytes(), b"/a");
            {
                let inner = outer.enter(b"b").unwrap();
                assert_eq!(inner.path().as_bytes(), b"/a/b");
            }
            assert_eq!(outer.path().as_bytes(), b"/a");
        }
        assert!(ctx.path().is_root());
    }

    #[test]
    fn test_deleted_needs_capability() {
        let mut ctx = WalkContext::new(MemoryBackend::new(2))
            .with_options(WalkOptions::default().with_deleted(true));
        assert!(!ctx.include_deleted());
        assert!(!ctx.toggle_deleted());

        let mut ctx = WalkContext::new(MemoryBackend::new(2).with_capabilities(Capabilities::LIST_DELETED));
        assert!(!ctx.include_deleted());
        assert!(ctx.toggle_deleted());
        assert!(ctx.include_deleted());
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let ctx = WalkContext::new(MemoryBackend::new(2)).with_cancel_flag(flag.clone());
        assert!(ctx.check_cancelled().is_ok());
        flag.handle().store(true, Ordering::SeqCst);
        assert!(matches!(ctx.check_cancelled(), Err(WalkError::Cancelled)));
    }
}
