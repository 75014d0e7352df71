//! Directory tree traversal
//!
//! Two modes share one core: [`DirectoryWalker::dump`] visits every reachable
//! directory and writes the forensic log, [`DirectoryWalker::browse`] follows
//! one path at a time under the control of a [`CommandSource`].
//!
//! Damaged volumes can encode a directory inside itself. Every descent is
//! checked against the inodes entered on the current path and against
//! [`MAX_DEPTH`], so neither mode can loop or recurse without bound.

mod command;
mod context;
mod listing;
mod path;

pub use command::{parse_command, Command, CommandSource, DirectoryView, LineCommandSource, ScriptedCommands};
pub use context::{
    AncestorStack, CancelFlag, Capabilities, PathGuard, WalkContext, WalkOptions, MAX_DEPTH,
};
pub use listing::{
    format_entry_line, format_entry_line_in, format_timestamp, ListingSink, RecordingSink,
    TracingSink, WriterSink,
};
pub use path::{VirtualPath, MAX_PATH_LEN};

use serde::{Deserialize, Serialize};

use crate::backend::DirectoryBackend;
use crate::entry::{DirectoryEntry, Inode};
use crate::error::WalkError;
use crate::export::{export_entry, ExportReport};
use crate::local::LocalPathBuilder;

/// Counters collected during a walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    pub directories_visited: u64,
    pub entries_listed: u64,
    /// Directories whose listing came back empty
    pub damaged_directories: u64,
    /// Descents refused because the inode is already on the current path
    pub loops_avoided: u64,
    /// Branches cut at the depth cap
    pub depth_truncated: u64,
    /// Branches skipped because their path would not fit
    pub paths_too_long: u64,
}

/// How a browsing frame ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Return to the parent directory
    Back,
    /// Leave the browser entirely
    Quit,
}

/// Why a child directory may not be entered
fn refuse_descent(entry: &DirectoryEntry, current: Inode, min_inode: Inode) -> bool {
    !entry.is_dir()
        || entry.inode() == current
        || entry.is_self_marker()
        || entry.is_parent_marker()
        || entry.inode() < min_inode
}

/// Recursive walker over a backend's directory graph
pub struct DirectoryWalker<B> {
    ctx: WalkContext<B>,
}

impl<B: DirectoryBackend> DirectoryWalker<B> {
    pub fn new(ctx: WalkContext<B>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &WalkContext<B> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut WalkContext<B> {
        &mut self.ctx
    }

    pub fn into_context(self) -> WalkContext<B> {
        self.ctx
    }

    /// Log every directory reachable from `inode`, depth first
    pub fn dump(&mut self, inode: Inode) -> Result<WalkStats, WalkError> {
        tracing::info!("Listing {} from inode {}", self.ctx.backend.describe(), inode);
        let mut stats = WalkStats::default();
        dump_node(&mut self.ctx, inode, 0, &mut stats)?;
        tracing::info!(
            "Listed {} directories, {} entries ({} damaged, {} loops avoided)",
            stats.directories_visited,
            stats.entries_listed,
            stats.damaged_directories,
            stats.loops_avoided
        );
        Ok(stats)
    }

    /// Dump from the backend's root directory
    pub fn dump_root(&mut self) -> Result<WalkStats, WalkError> {
        let root = self.ctx.backend.root_inode();
        self.dump(root)
    }

    /// Navigate interactively starting at `inode`
    pub fn browse(&mut self, inode: Inode, source: &mut dyn CommandSource) -> Result<(), WalkError> {
        if self.ctx.options.verbosity > 0 {
            tracing::debug!("Browsing {} from inode {}", self.ctx.backend.describe(), inode);
        }
        browse_node(&mut self.ctx, inode, 0, source).map(|_| ())
    }

    /// Export `entry` found in the current directory
    ///
    /// `.` exports the current directory itself; `..` is refused.
    pub fn export(&mut self, entry: &DirectoryEntry) -> ExportReport {
        self.ctx.ancestors = AncestorStack::new();
        export_child(&mut self.ctx, entry, 0)
    }

    /// Export the whole tree below the root into `destination`
    pub fn export_root(&mut self, destination: LocalPathBuilder) -> ExportReport {
        let root = DirectoryEntry::directory(".", self.ctx.backend.root_inode());
        self.ctx.set_destination(destination);
        self.ctx.ancestors = AncestorStack::new();
        export_child(&mut self.ctx, &root, 0)
    }
}

fn dump_node<B: DirectoryBackend>(
    ctx: &mut WalkContext<B>,
    inode: Inode,
    depth: usize,
    stats: &mut WalkStats,
) -> Result<(), WalkError> {
    ctx.check_cancelled()?;
    if depth >= MAX_DEPTH {
        tracing::warn!("{} at {}", WalkError::DepthExceeded { depth }, ctx.path);
        stats.depth_truncated += 1;
        return Ok(());
    }
    if ctx.options.verbosity > 0 {
        tracing::debug!("Visiting inode {} at depth {}", inode, depth);
    }

    ctx.ancestors.enter(depth, inode);
    let entries = ctx.list_entries(inode);
    ctx.check_cancelled()?;
    stats.directories_visited += 1;
    stats.entries_listed += entries.len() as u64;
    if entries.is_empty() {
        stats.damaged_directories += 1;
    }

    let min_inode = ctx.backend.min_inode();
    for entry in &entries {
        if refuse_descent(entry, inode, min_inode) {
            continue;
        }
        if ctx.ancestors.is_ancestor(depth, entry.inode()) {
            tracing::debug!("Loop: {} (inode {}) is an ancestor of {}", entry.name_lossy(), entry.inode(), ctx.path);
            stats.loops_avoided += 1;
            continue;
        }

        let mut child = match ctx.enter(&entry.name) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", entry.name_lossy(), e);
                stats.paths_too_long += 1;
                continue;
            }
        };
        dump_node(&mut *child, entry.inode(), depth + 1, stats)?;
    }
    Ok(())
}

fn view_of<'a, B: DirectoryBackend>(
    ctx: &'a WalkContext<B>,
    inode: Inode,
    depth: usize,
    entries: &'a [DirectoryEntry],
) -> DirectoryView<'a> {
    DirectoryView {
        path: &ctx.path,
        inode,
        depth,
        entries,
        include_deleted: ctx.include_deleted(),
        can_toggle_deleted: ctx.capabilities.contains(Capabilities::LIST_DELETED),
        destination: ctx.destination.as_ref().map(|d| d.root()),
    }
}

fn browse_node<B: DirectoryBackend>(
    ctx: &mut WalkContext<B>,
    inode: Inode,
    depth: usize,
    source: &mut dyn CommandSource,
) -> Result<Navigation, WalkError> {
    if depth >= MAX_DEPTH {
        tracing::warn!("{} at {}", WalkError::DepthExceeded { depth }, ctx.path);
        return Ok(Navigation::Back);
    }
    if ctx.options.verbosity > 0 {
        tracing::debug!("Visiting inode {} at depth {}", inode, depth);
    }

    loop {
        ctx.ancestors.enter(depth, inode);
        let entries = ctx.list_entries(inode);
        ctx.check_cancelled()?;

        let command = source.next_command(&view_of(ctx, inode, depth, &entries));

        match command {
            Command::Quit => return Ok(Navigation::Quit),
            Command::Back if depth > 0 => return Ok(Navigation::Back),
            Command::Back => {}
            Command::ToggleDeleted => {
                if !ctx.toggle_deleted() {
                    tracing::debug!("Backend cannot list deleted entries");
                }
            }
            Command::Enter(index) => {
                let Some(entry) = entries.get(index) else {
                    continue;
                };
                if entry.is_dir() && entry.is_parent_marker() {
                    if depth > 0 {
                        return Ok(Navigation::Back);
                    }
                    continue;
                }
                if refuse_descent(entry, inode, ctx.backend.min_inode()) {
                    continue;
                }
                if ctx.ancestors.is_ancestor(depth, entry.inode()) {
                    tracing::debug!("Loop: {} (inode {}) is an ancestor of {}", entry.name_lossy(), entry.inode(), ctx.path);
                    continue;
                }

                let mut child = match ctx.enter(&entry.name) {
                    Ok(child) => child,
                    Err(e) => {
                        tracing::warn!("Cannot enter {}: {}", entry.name_lossy(), e);
                        continue;
                    }
                };
                if browse_node(&mut *child, entry.inode(), depth + 1, source)? == Navigation::Quit {
                    return Ok(Navigation::Quit);
                }
            }
            Command::Copy(index) => {
                let Some(entry) = entries.get(index) else {
                    continue;
                };
                if entry.is_parent_marker() {
                    continue;
                }
                if ctx.destination.is_none() {
                    let chosen = source.choose_destination(&view_of(ctx, inode, depth, &entries), entry);
                    match chosen {
                        Some(root) => ctx.set_destination(LocalPathBuilder::new(root)),
                        None => continue,
                    }
                }
                let report = export_child(ctx, entry, depth);
                source.copy_finished(entry, &report);
            }
        }
    }
}

/// Export an entry of the directory at the context's current path, which sits
/// at `depth`
fn export_child<B: DirectoryBackend>(
    ctx: &mut WalkContext<B>,
    entry: &DirectoryEntry,
    depth: usize,
) -> ExportReport {
    if entry.is_self_marker() {
        return export_entry(ctx, entry, depth);
    }
    if entry.is_parent_marker() {
        tracing::warn!("Refusing to export the parent directory of {}", ctx.path);
        return ExportReport::empty();
    }
    match ctx.enter(&entry.name) {
        Ok(mut child) => export_entry(&mut *child, entry, depth + 1),
        Err(e) => {
            tracing::warn!("Cannot export {}: {}", entry.name_lossy(), e);
            ExportReport::truncated()
        }
    }
}
