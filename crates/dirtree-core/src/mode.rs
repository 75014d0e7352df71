//! Portable (Linux `st_mode` layout) mode bits
//!
//! Backends report modes in the Linux layout whatever the on-disk format is;
//! this module renders them for the forensic log and maps them to the host's
//! permission model when restoring exported files.

use std::io;
use std::path::Path;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

pub const S_ISUID: u32 = 0o4000;
pub const S_ISGID: u32 = 0o2000;
pub const S_ISVTX: u32 = 0o1000;

pub const S_IRUSR: u32 = 0o400;
pub const S_IWUSR: u32 = 0o200;
pub const S_IXUSR: u32 = 0o100;
pub const S_IRGRP: u32 = 0o040;
pub const S_IWGRP: u32 = 0o020;
pub const S_IXGRP: u32 = 0o010;
pub const S_IROTH: u32 = 0o004;
pub const S_IWOTH: u32 = 0o002;
pub const S_IXOTH: u32 = 0o001;

/// Width of the rendered mode string
pub const MODE_STRING_LEN: usize = 10;

pub fn is_dir(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

pub fn is_regular(mode: u32) -> bool {
    mode & S_IFMT == S_IFREG
}

/// Single-letter file type as shown by `ls -l`
pub fn file_type_char(mode: u32) -> char {
    match mode & S_IFMT {
        S_IFBLK => 'b',
        S_IFCHR => 'c',
        S_IFDIR => 'd',
        S_IFREG => '-',
        S_IFIFO => 'p',
        S_IFLNK => 'l',
        S_IFSOCK => 's',
        _ => '?',
    }
}

/// Render `mode` as a 10-character `ls -l` style string, e.g. `drwxr-xr-x`
pub fn mode_string(mode: u32) -> String {
    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };

    let mut chars = [
        file_type_char(mode),
        bit(S_IRUSR, 'r'),
        bit(S_IWUSR, 'w'),
        bit(S_IXUSR, 'x'),
        bit(S_IRGRP, 'r'),
        bit(S_IWGRP, 'w'),
        bit(S_IXGRP, 'x'),
        bit(S_IROTH, 'r'),
        bit(S_IWOTH, 'w'),
        bit(S_IXOTH, 'x'),
    ];

    // Special bits overlay the execute column: lower case when it is also
    // executable, upper case otherwise.
    let overlay = |slot: &mut char, set: bool, exec: char, no_exec: char| {
        if set {
            *slot = if *slot == 'x' { exec } else { no_exec };
        }
    };
    overlay(&mut chars[3], mode & S_ISUID != 0, 's', 'S');
    overlay(&mut chars[6], mode & S_ISGID != 0, 's', 'S');
    overlay(&mut chars[9], mode & S_ISVTX != 0, 't', 'T');

    chars.iter().collect()
}

/// Nearest host permission bits for a portable mode
///
/// Only the nine rwx bits are carried over; set-id and sticky bits are never
/// restored on recovered files.
pub fn host_permissions(mode: u32) -> u32 {
    const TABLE: [(u32, u32); 9] = [
        (S_IRUSR, 0o400),
        (S_IWUSR, 0o200),
        (S_IXUSR, 0o100),
        (S_IRGRP, 0o040),
        (S_IWGRP, 0o020),
        (S_IXGRP, 0o010),
        (S_IROTH, 0o004),
        (S_IWOTH, 0o002),
        (S_IXOTH, 0o001),
    ];

    TABLE
        .iter()
        .filter(|(portable, _)| mode & portable != 0)
        .fold(0, |acc, (_, host)| acc | host)
}

/// Best-effort permission restore on a host path
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(host_permissions(mode)))
}

/// Hosts without a permission-bit model keep the default permissions
#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
