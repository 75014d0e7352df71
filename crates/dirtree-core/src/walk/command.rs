//! Commands driving interactive navigation
//!
//! The walker never talks to a terminal. It hands a [`DirectoryView`] to a
//! [`CommandSource`] and acts on the [`Command`] it gets back.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use super::listing::format_entry_line;
use super::path::VirtualPath;
use crate::entry::{DirectoryEntry, Inode};
use crate::export::{ExportOutcome, ExportReport};

/// What to do next in the current directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Descend into the entry at this index of the view
    Enter(usize),
    /// Return to the parent directory
    Back,
    /// Copy the entry at this index (recursively for directories)
    Copy(usize),
    /// Show or hide deleted entries
    ToggleDeleted,
    /// Leave the browser
    Quit,
}

/// Snapshot of the directory presented to a command source
#[derive(Debug, Clone, Copy)]
pub struct DirectoryView<'a> {
    pub path: &'a VirtualPath,
    pub inode: Inode,
    pub depth: usize,
    /// Entries in presentation order; commands index into this slice
    pub entries: &'a [DirectoryEntry],
    pub include_deleted: bool,
    pub can_toggle_deleted: bool,
    pub destination: Option<&'a Path>,
}

impl DirectoryView<'_> {
    pub fn can_go_back(&self) -> bool {
        self.depth > 0
    }
}

/// Source of navigation commands, usually a user at a terminal
pub trait CommandSource {
    fn next_command(&mut self, view: &DirectoryView<'_>) -> Command;

    /// Asked when a copy is requested and no destination is configured yet
    fn choose_destination(&mut self, _view: &DirectoryView<'_>, _entry: &DirectoryEntry) -> Option<PathBuf> {
        None
    }

    /// Called once a requested copy has finished
    fn copy_finished(&mut self, _entry: &DirectoryEntry, _report: &ExportReport) {}
}

/// Replays a fixed list of commands, then quits
#[derive(Debug, Default, Clone)]
pub struct ScriptedCommands {
    commands: VecDeque<Command>,
    destination: Option<PathBuf>,
    reports: Vec<ExportReport>,
}

impl ScriptedCommands {
    pub fn new(commands: impl IntoIterator<Item = Command>) -> Self {
        Self {
            commands: commands.into_iter().collect(),
            destination: None,
            reports: Vec::new(),
        }
    }

    /// Destination given when a copy asks for one
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Reports of the copies performed so far
    pub fn reports(&self) -> &[ExportReport] {
        &self.reports
    }
}

impl CommandSource for ScriptedCommands {
    fn next_command(&mut self, _view: &DirectoryView<'_>) -> Command {
        self.commands.pop_front().unwrap_or(Command::Quit)
    }

    fn choose_destination(&mut self, _view: &DirectoryView<'_>, _entry: &DirectoryEntry) -> Option<PathBuf> {
        self.destination.clone()
    }

    fn copy_finished(&mut self, _entry: &DirectoryEntry, report: &ExportReport) {
        self.reports.push(report.clone());
    }
}

/// Line-oriented command source for plain terminals and pipes
pub struct LineCommandSource<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineCommandSource<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    fn say(&mut self, text: std::fmt::Arguments<'_>) {
        if self.output.write_fmt(text).and_then(|()| self.output.flush()).is_err() {
            tracing::debug!("Command output closed");
        }
    }

    /// Next trimmed input line; None at end of input
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }

    fn render(&mut self, view: &DirectoryView<'_>) {
        self.say(format_args!("Directory {}\n", view.path));
        if view.entries.is_empty() {
            self.say(format_args!("No file found, filesystem seems damaged.\n"));
        }
        for (index, entry) in view.entries.iter().enumerate() {
            self.say(format_args!("{:>4} {}\n", index, format_entry_line(entry, None)));
        }

        let mut help = String::from("N: enter, ");
        if view.can_go_back() {
            help.push_str("b: back, ");
        }
        help.push_str("cp N: copy, ");
        if view.can_toggle_deleted {
            help.push_str(if view.include_deleted {
                "h: hide deleted files, "
            } else {
                "h: unhide deleted files, "
            });
        }
        help.push_str("q: quit");
        self.say(format_args!("{}\n> ", help));
    }
}

/// Parse one command line; None for anything unrecognized
pub fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let first = words.next()?;
    let index = |word: Option<&str>| word.and_then(|w| w.parse::<usize>().ok());

    let command = match first {
        "q" | "quit" => Command::Quit,
        "b" | "back" | ".." | "-" => Command::Back,
        "h" => Command::ToggleDeleted,
        "c" | "cp" | "copy" => Command::Copy(index(words.next())?),
        "cd" => Command::Enter(index(words.next())?),
        other => Command::Enter(other.parse().ok()?),
    };
    if words.next().is_some() {
        return None;
    }
    Some(command)
}

impl<R: BufRead, W: Write> CommandSource for LineCommandSource<R, W> {
    fn next_command(&mut self, view: &DirectoryView<'_>) -> Command {
        self.render(view);
        loop {
            let Some(line) = self.read_line() else {
                return Command::Quit;
            };
            match parse_command(&line) {
                Some(command) => return command,
                None if line.is_empty() => self.say(format_args!("> ")),
                None => self.say(format_args!("Unknown command: {}\n> ", line)),
            }
        }
    }

    fn choose_destination(&mut self, view: &DirectoryView<'_>, entry: &DirectoryEntry) -> Option<PathBuf> {
        let what = if entry.is_dir() {
            format!("{} and any files below", view.path)
        } else {
            format!("{}", entry.name_lossy())
        };
        self.say(format_args!("Copy {} to which directory? (empty to cancel) ", what));
        let line = self.read_line()?;
        (!line.is_empty()).then(|| PathBuf::from(line))
    }

    fn copy_finished(&mut self, _entry: &DirectoryEntry, report: &ExportReport) {
        let message = match report.outcome {
            ExportOutcome::Complete => "Copy done!",
            ExportOutcome::Partial => "Copy done! (Failed to copy some files)",
            ExportOutcome::Failed => "Copy failed!",
            ExportOutcome::NothingCopied => "Nothing copied.",
        };
        self.say(format_args!("{}\n", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command(".."), Some(Command::Back));
        assert_eq!(parse_command("3"), Some(Command::Enter(3)));
        assert_eq!(parse_command("cd 12"), Some(Command::Enter(12)));
        assert_eq!(parse_command("cp 1"), Some(Command::Copy(1)));
        assert_eq!(parse_command("h"), Some(Command::ToggleDeleted));
        assert_eq!(parse_command("cp"), None);
        assert_eq!(parse_command("cd 1 2"), None);
        assert_eq!(parse_command("frobnicate"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_line_source_skips_garbage() {
        let path = VirtualPath::root();
        let entries = [DirectoryEntry::directory(".", 2), DirectoryEntry::directory("docs", 12)];
        let view = DirectoryView {
            path: &path,
            inode: 2,
            depth: 0,
            entries: &entries,
            include_deleted: false,
            can_toggle_deleted: false,
            destination: None,
        };

        let input = Cursor::new("nonsense\n\n1\n");
        let mut source = LineCommandSource::new(input, Vec::new());
        assert_eq!(source.next_command(&view), Command::Enter(1));
        assert_eq!(source.next_command(&view), Command::Quit);

        let (_, output) = source.into_inner();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("Directory /\n"));
        assert!(output.contains("Unknown command: nonsense"));
        assert!(output.contains(" docs\n"));
        assert!(!output.contains("b: back"));
    }

    #[test]
    fn test_scripted_commands_end_with_quit() {
        let path = VirtualPath::root();
        let view = DirectoryView {
            path: &path,
            inode: 2,
            depth: 0,
            entries: &[],
            include_deleted: false,
            can_toggle_deleted: false,
            destination: None,
        };
        let mut source = ScriptedCommands::new([Command::Enter(0)]);
        assert_eq!(source.next_command(&view), Command::Enter(0));
        assert_eq!(source.next_command(&view), Command::Quit);
    }
}
