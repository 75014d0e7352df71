//! Presentation order of a directory listing
use std::cmp::Ordering;

use crate::entry::DirectoryEntry;

fn directory_rank(entry: &DirectoryEntry) -> u8 {
    if entry.is_self_marker() {
        0
    } else if entry.is_parent_marker() {
        1
    } else {
        2
    }
}

/// Directories first (`.` then `..` then by name), then everything else by name
///
/// Names compare byte-wise.
pub fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (true, true) => directory_rank(a)
            .cmp(&directory_rank(b))
            .then_with(|| a.name.cmp(&b.name)),
        (false, false) => a.name.cmp(&b.name),
    }
}

/// Stable sort of a listing into presentation order
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(compare_entries);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(entries: &[DirectoryEntry]) -> Vec<String> {
        entries.iter().map(|e| e.name_lossy().into_owned()).collect()
    }

    #[test]
    fn test_reference_order() {
        let mut entries = vec![
            DirectoryEntry::file("b.txt", 20, 1),
            DirectoryEntry::directory("..", 2),
            DirectoryEntry::directory(".", 11),
            DirectoryEntry::directory("a_dir", 12),
            DirectoryEntry::directory("z_dir", 13),
        ];
        sort_entries(&mut entries);
        assert_eq!(names(&entries), [".", "..", "a_dir", "z_dir", "b.txt"]);
    }

    #[test]
    fn test_markers_only_special_for_directories() {
        // A regular file called ".." is just a file
        let mut entries = vec![
            DirectoryEntry::file("..", 30, 0),
            DirectoryEntry::file("-", 31, 0),
            DirectoryEntry::directory("..", 2),
            DirectoryEntry::directory("!", 32),
        ];
        sort_entries(&mut entries);
        assert_eq!(names(&entries), ["..", "!", "-", ".."]);
        assert!(entries[0].is_dir());
        assert!(!entries[3].is_dir());
    }

    #[test]
    fn test_bytewise_names() {
        let mut entries = vec![
            DirectoryEntry::file("a", 40, 0),
            DirectoryEntry::file("B", 41, 0),
            DirectoryEntry::file(vec![0xE9], 42, 0),
        ];
        sort_entries(&mut entries);
        assert_eq!(entries[0].name, b"B");
        assert_eq!(entries[1].name, b"a");
        assert_eq!(entries[2].name, [0xE9]);
    }

    #[test]
    fn test_comparator_is_antisymmetric() {
        let entries = [
            DirectoryEntry::directory(".", 1),
            DirectoryEntry::directory("..", 2),
            DirectoryEntry::directory("x", 3),
            DirectoryEntry::file("x", 4, 0),
        ];
        for a in &entries {
            for b in &entries {
                assert_eq!(compare_entries(a, b), compare_entries(b, a).reverse());
            }
        }
    }
}
