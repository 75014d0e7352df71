//! Forensic log lines for directory listings
use chrono::{DateTime, Local, TimeZone, Utc};
use std::io::Write;
use std::sync::{Arc, Mutex};

use super::path::VirtualPath;
use crate::entry::DirectoryEntry;
use crate::mode::mode_string;

/// Width of the date column, kept when no timestamp was recorded
const DATE_WIDTH: usize = 17;

/// `DD-Mon-YYYY HH:MM` with a space-padded day, or blanks
pub fn format_timestamp<Tz>(time: Option<DateTime<Utc>>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match time {
        Some(time) if time.timestamp() != 0 => {
            time.with_timezone(tz).format("%e-%b-%Y %H:%M").to_string()
        }
        _ => " ".repeat(DATE_WIDTH),
    }
}

/// One log line for `entry`, dates in local time
///
/// `directory` adds the virtual path of the containing directory before the
/// name.
pub fn format_entry_line(entry: &DirectoryEntry, directory: Option<&VirtualPath>) -> String {
    format_entry_line_in(entry, directory, &Local)
}

pub fn format_entry_line_in<Tz>(
    entry: &DirectoryEntry,
    directory: Option<&VirtualPath>,
    tz: &Tz,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stat = &entry.stat;
    let prefix = match directory {
        Some(path) if path.is_root() => String::from("/"),
        Some(path) => format!("{}/", path),
        None => String::new(),
    };

    format!(
        "{}{:>7} {} {:>5}  {:>5}   {:>7} {} {}{}",
        if entry.is_deleted() { 'X' } else { ' ' },
        stat.inode,
        mode_string(stat.mode),
        stat.uid,
        stat.gid,
        stat.size,
        format_timestamp(stat.modified, tz),
        prefix,
        entry.name_lossy()
    )
}

/// Destination of the forensic directory log
pub trait ListingSink {
    /// A directory is about to be listed
    fn directory(&mut self, path: &VirtualPath);

    /// One formatted entry line
    fn entry(&mut self, line: &str);
}

/// Emits the log through `tracing` at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ListingSink for TracingSink {
    fn directory(&mut self, path: &VirtualPath) {
        tracing::info!("Directory {}", path);
    }

    fn entry(&mut self, line: &str) {
        tracing::info!("{}", line);
    }
}

/// Writes the log to any `Write`, one line per entry
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.writer, "{}", line) {
            tracing::warn!("Failed to write listing: {}", e);
        }
    }
}

impl<W: Write> ListingSink for WriterSink<W> {
    fn directory(&mut self, path: &VirtualPath) {
        self.write_line(format_args!("Directory {}", path));
    }

    fn entry(&mut self, line: &str) {
        self.write_line(format_args!("{}", line));
    }
}

/// Keeps lines in memory; clones share the same buffer
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    /// Only the `Directory ...` header lines, in visit order
    pub fn directories(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|line| line.strip_prefix("Directory ").map(str::to_string))
            .collect()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

impl ListingSink for RecordingSink {
    fn directory(&mut self, path: &VirtualPath) {
        self.push(format!("Directory {}", path));
    }

    fn entry(&mut self, line: &str) {
        self.push(line.to_string());
    }
}
