//! Mirroring a recovered subtree onto the host filesystem
//!
//! A failed file never stops its siblings. Each directory aggregates what
//! happened below it into an [`ExportOutcome`], which its parent folds into
//! its own outcome.

use serde::{Deserialize, Serialize};

use crate::backend::{CopyTarget, DirectoryBackend};
use crate::entry::DirectoryEntry;
use crate::local::{set_times, LocalPathBuilder};
use crate::error::WalkError;
use crate::walk::{AncestorStack, WalkContext, MAX_DEPTH};

/// Aggregated result of exporting an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportOutcome {
    /// Everything below was copied
    Complete,
    /// Some copies succeeded, some failed
    Partial,
    /// Nothing could be copied
    Failed,
    /// There was nothing to copy
    NothingCopied,
}

impl ExportOutcome {
    fn from_flags(copied: bool, failed: bool) -> Self {
        match (copied, failed) {
            (true, false) => ExportOutcome::Complete,
            (true, true) => ExportOutcome::Partial,
            (false, true) => ExportOutcome::Failed,
            (false, false) => ExportOutcome::NothingCopied,
        }
    }

    /// How a subdirectory's outcome counts for its parent
    pub fn counts_as_success(self) -> bool {
        matches!(self, ExportOutcome::Complete | ExportOutcome::NothingCopied)
    }
}

impl std::fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportOutcome::Complete => write!(f, "complete"),
            ExportOutcome::Partial => write!(f, "partial"),
            ExportOutcome::Failed => write!(f, "failed"),
            ExportOutcome::NothingCopied => write!(f, "nothing copied"),
        }
    }
}

/// Outcome of an export together with its counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub outcome: ExportOutcome,
    pub files_copied: u64,
    pub files_failed: u64,
    pub directories_created: u64,
    /// Subtrees not descended because of the path or depth limits
    pub subtrees_truncated: u64,
    /// Timestamp restores that failed on directories
    pub timestamp_failures: u64,
}

impl ExportReport {
    pub(crate) fn empty() -> Self {
        Self {
            outcome: ExportOutcome::NothingCopied,
            files_copied: 0,
            files_failed: 0,
            directories_created: 0,
            subtrees_truncated: 0,
            timestamp_failures: 0,
        }
    }

    /// Report for an entry whose path did not fit
    pub(crate) fn truncated() -> Self {
        Self {
            outcome: ExportOutcome::Failed,
            subtrees_truncated: 1,
            ..Self::empty()
        }
    }
}

struct ExportState {
    local: LocalPathBuilder,
    ancestors: AncestorStack,
    report: ExportReport,
}

/// Export `entry`, whose virtual path is the context's current path
///
/// Directories are mirrored recursively, regular files are handed to the
/// backend. Anything else, or a context without a destination, exports
/// nothing.
///
/// `depth` is the depth of `entry` on the walk. The context's ancestors up to
/// that depth stay in force, so an export started deep in a browse neither
/// re-enters a directory above it nor gets a fresh depth budget.
pub fn export_entry<B: DirectoryBackend>(
    ctx: &mut WalkContext<B>,
    entry: &DirectoryEntry,
    depth: usize,
) -> ExportReport {
    let mut report = ExportReport::empty();
    let Some(local) = ctx.destination.clone() else {
        tracing::warn!("No destination configured, nothing exported for {}", ctx.path);
        return report;
    };

    if entry.is_dir() {
        let mut state = ExportState {
            local,
            ancestors: ctx.ancestors.clone(),
            report,
        };
        let outcome = if depth >= MAX_DEPTH {
            tracing::warn!("{} at {}", WalkError::DepthExceeded { depth }, ctx.path);
            state.report.subtrees_truncated += 1;
            ExportOutcome::Failed
        } else {
            export_directory(ctx, &mut state, entry, depth)
        };
        report = state.report;
        report.outcome = outcome;
    } else if entry.is_regular() {
        let copied = copy_one(ctx, &local, entry, &mut report);
        report.outcome = ExportOutcome::from_flags(copied, !copied);
    }

    tracing::info!(
        "Export of {} {}: {} file(s) copied, {} failed",
        ctx.path,
        report.outcome,
        report.files_copied,
        report.files_failed
    );
    report
}

fn copy_one<B: DirectoryBackend>(
    ctx: &mut WalkContext<B>,
    local: &LocalPathBuilder,
    entry: &DirectoryEntry,
    report: &mut ExportReport,
) -> bool {
    let target = CopyTarget {
        path: &ctx.path,
        local,
    };
    match ctx.backend.copy_file(&target, entry) {
        Ok(()) => {
            report.files_copied += 1;
            true
        }
        Err(e) => {
            tracing::warn!("Failed to copy {}: {}", ctx.path, e);
            report.files_failed += 1;
            false
        }
    }
}

fn export_directory<B: DirectoryBackend>(
    ctx: &mut WalkContext<B>,
    state: &mut ExportState,
    dir: &DirectoryEntry,
    depth: usize,
) -> ExportOutcome {
    let inode = dir.inode();
    state.ancestors.enter(depth, inode);

    let host_dir = match state.local.create_dir(ctx.path.as_bytes()) {
        Ok(path) => {
            state.report.directories_created += 1;
            Some(path)
        }
        Err(e) => {
            tracing::warn!("Cannot create directory for {}: {}", ctx.path, e);
            None
        }
    };

    let entries = ctx.fetch_entries(inode);
    let min_inode = ctx.backend.min_inode();
    let mut copied = false;
    let mut failed = false;

    for child in &entries {
        let exportable = child.is_dir() || child.is_regular();
        if !exportable {
            continue;
        }
        if child.is_dir() {
            let child_inode = child.inode();
            if child_inode == inode || child.is_self_marker() || child.is_parent_marker() {
                continue;
            }
            if child_inode < min_inode || state.ancestors.is_ancestor(depth, child_inode) {
                tracing::debug!("Skipping {} (inode {}) below {}: loop", child.name_lossy(), child_inode, ctx.path);
                continue;
            }
            if depth + 1 >= MAX_DEPTH {
                tracing::warn!("{} below {}", WalkError::DepthExceeded { depth: depth + 1 }, ctx.path);
                state.report.subtrees_truncated += 1;
                failed = true;
                continue;
            }
        }

        let mut guard = match ctx.enter(&child.name) {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!("Cannot export {}: {}", child.name_lossy(), e);
                state.report.subtrees_truncated += 1;
                failed = true;
                continue;
            }
        };

        let ok = if child.is_dir() {
            export_directory(&mut *guard, state, child, depth + 1).counts_as_success()
        } else {
            copy_one(&mut *guard, &state.local, child, &mut state.report)
        };
        if ok {
            copied = true;
        } else {
            failed = true;
        }
    }

    if let Some(path) = host_dir {
        if let Err(e) = set_times(&path, dir.stat.accessed, dir.stat.modified) {
            tracing::warn!("Couldn't set the date and time for {}: {}", path.display(), e);
            state.report.timestamp_failures += 1;
        }
    }

    ExportOutcome::from_flags(copied, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_flags() {
        assert_eq!(ExportOutcome::from_flags(true, false), ExportOutcome::Complete);
        assert_eq!(ExportOutcome::from_flags(true, true), ExportOutcome::Partial);
        assert_eq!(ExportOutcome::from_flags(false, true), ExportOutcome::Failed);
        assert_eq!(ExportOutcome::from_flags(false, false), ExportOutcome::NothingCopied);
    }

    #[test]
    fn test_parent_contribution() {
        assert!(ExportOutcome::Complete.counts_as_success());
        assert!(ExportOutcome::NothingCopied.counts_as_success());
        assert!(!ExportOutcome::Partial.counts_as_success());
        assert!(!ExportOutcome::Failed.counts_as_success());
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let json = serde_json::to_string(&ExportOutcome::NothingCopied).unwrap();
        assert_eq!(json, "\"nothing_copied\"");
    }
}
