//! Directory-tree engine for damaged filesystem images
//!
//! Walks the directory graph exposed by a [`DirectoryBackend`], either dumping
//! every reachable directory to a forensic log or letting a user browse it and
//! copy files out to the host. Cycles and runaway depth encoded in a corrupted
//! volume are detected rather than followed.

pub mod backend;
pub mod entry;
pub mod error;
pub mod export;
pub mod local;
pub mod mode;
pub mod ordering;
pub mod walk;

// Re-export the engine surface
pub use backend::{CopyTarget, DirectoryBackend, HostBackend, ListRequest, MemoryBackend};
pub use entry::{DirectoryEntry, EntryStat, EntryStatus, Inode};
pub use error::{CopyError, LocalPathError, WalkError};
pub use export::{export_entry, ExportOutcome, ExportReport};
pub use walk::{
    CancelFlag, Capabilities, Command, CommandSource, DirectoryWalker, LineCommandSource,
    ListingSink, RecordingSink, ScriptedCommands, TracingSink, VirtualPath, WalkContext,
    WalkOptions, WalkStats, WriterSink,
};

// Re-export destination handling for callers configuring exports
pub use local::{sanitize_segment, LocalPathBuilder, Ruleset};
