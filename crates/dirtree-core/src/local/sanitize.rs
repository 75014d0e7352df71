//! Filename rewriting for the destination host's naming rules
//!
//! Names recovered from a damaged volume may contain bytes the host
//! filesystem refuses. Each segment is rewritten deterministically so that
//! the same source name always lands on the same local name, and rewriting an
//! already rewritten name changes nothing.

use serde::{Deserialize, Serialize};

/// Replacement for every rejected byte
pub const REPLACEMENT: u8 = b'_';

/// Naming rules of a destination filesystem family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ruleset {
    /// FAT volumes written by DOS: 8-bit names, accented letters folded to ASCII
    Dos,
    /// Win32 namespace on NTFS/FAT
    Windows,
    /// HFS+/APFS: names must be valid UTF-8
    Apple,
    /// Any byte except NUL and `/`
    Posix,
}

impl Ruleset {
    /// Ruleset of the platform this binary was built for
    pub const fn native() -> Self {
        if cfg!(windows) {
            Ruleset::Windows
        } else if cfg!(any(target_os = "macos", target_os = "ios")) {
            Ruleset::Apple
        } else {
            Ruleset::Posix
        }
    }

    fn strips_trailing(self) -> bool {
        matches!(self, Ruleset::Dos | Ruleset::Windows)
    }

    fn requires_utf8(self) -> bool {
        matches!(self, Ruleset::Windows | Ruleset::Apple)
    }

    fn convert_byte(self, byte: u8) -> u8 {
        if byte == b'/' || byte == 0 {
            return REPLACEMENT;
        }
        match self {
            Ruleset::Dos => match byte {
                0x00..=0x1F => REPLACEMENT,
                b'<' | b'>' | b':' | b'"' | b'\\' | b'|' | b'?' | b'*' => REPLACEMENT,
                // Legal but refused by several DOS tools
                b'[' | b']' | b';' | b',' | b'+' | b'=' => REPLACEMENT,
                _ => fold_latin1(byte),
            },
            Ruleset::Windows => match byte {
                0x00..=0x1F => REPLACEMENT,
                b'<' | b'>' | b':' | b'"' | b'\\' | b'|' | b'?' | b'*' => REPLACEMENT,
                // Valid on NTFS, invalid on FAT
                b'[' | b']' | b'+' => REPLACEMENT,
                b';' | b',' | b'=' => REPLACEMENT,
                _ => byte,
            },
            Ruleset::Apple | Ruleset::Posix => byte,
        }
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        Ruleset::native()
    }
}

impl std::fmt::Display for Ruleset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ruleset::Dos => write!(f, "DOS"),
            Ruleset::Windows => write!(f, "Windows"),
            Ruleset::Apple => write!(f, "Apple"),
            Ruleset::Posix => write!(f, "POSIX"),
        }
    }
}

impl std::str::FromStr for Ruleset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dos" => Ok(Ruleset::Dos),
            "windows" => Ok(Ruleset::Windows),
            "apple" => Ok(Ruleset::Apple),
            "posix" => Ok(Ruleset::Posix),
            other => Err(format!("unknown naming ruleset: {}", other)),
        }
    }
}

/// Latin-1 lower-case accented letters to their ASCII base letter
fn fold_latin1(byte: u8) -> u8 {
    match byte {
        224..=230 => b'a',
        231 => b'c',
        232..=235 => b'e',
        236..=239 => b'i',
        241 => b'n',
        242..=246 | 248 => b'o',
        249..=252 => b'u',
        253..=255 => b'y',
        _ => byte,
    }
}

/// Replace each byte of every malformed UTF-8 sequence with `_`
fn repair_utf8(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.extend_from_slice(valid.as_bytes());
                return out;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                out.extend_from_slice(valid);
                let bad = err.error_len().unwrap_or(after.len());
                out.extend(std::iter::repeat(REPLACEMENT).take(bad));
                rest = &after[bad..];
            }
        }
    }
}

/// Rewrite one path segment for `ruleset`
///
/// The result is never empty and never `.`/`..`.
pub fn sanitize_segment(segment: &[u8], ruleset: Ruleset) -> Vec<u8> {
    let mut out = if ruleset.requires_utf8() {
        repair_utf8(segment)
    } else {
        segment.to_vec()
    };

    for byte in out.iter_mut() {
        *byte = ruleset.convert_byte(*byte);
    }

    if ruleset.strips_trailing() {
        while matches!(out.last(), Some(b' ') | Some(b'.')) {
            out.pop();
        }
    }

    if out.iter().all(|&b| b == b'.') {
        return vec![REPLACEMENT];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Ruleset; 4] = [Ruleset::Dos, Ruleset::Windows, Ruleset::Apple, Ruleset::Posix];

    #[test]
    fn test_ruleset_from_str() {
        assert_eq!("DOS".parse::<Ruleset>(), Ok(Ruleset::Dos));
        assert_eq!("posix".parse::<Ruleset>(), Ok(Ruleset::Posix));
        assert!("ntfs".parse::<Ruleset>().is_err());
    }

    #[test]
    fn test_dos_sample() {
        assert_eq!(sanitize_segment(b"a\x01b*c", Ruleset::Dos), b"a_b_c");
        assert_eq!(sanitize_segment(b"report[1].txt", Ruleset::Dos), b"report_1_.txt");
    }

    #[test]
    fn test_never_empty() {
        for ruleset in ALL {
            assert_eq!(sanitize_segment(b"", ruleset), b"_");
            assert_eq!(sanitize_segment(b".", ruleset), b"_");
            assert_eq!(sanitize_segment(b"..", ruleset), b"_");
        }
        assert_eq!(sanitize_segment(b" . .", Ruleset::Dos), b"_");
        assert_eq!(sanitize_segment(b"...  ", Ruleset::Windows), b"_");
    }

    #[test]
    fn test_trailing_dots_and_spaces() {
        assert_eq!(sanitize_segment(b"notes. . ", Ruleset::Windows), b"notes");
        assert_eq!(sanitize_segment(b"notes. ", Ruleset::Posix), b"notes. ");
        assert_eq!(sanitize_segment(b".profile", Ruleset::Dos), b".profile");
    }

    #[test]
    fn test_separator_never_survives() {
        for ruleset in ALL {
            let out = sanitize_segment(b"a/b", ruleset);
            assert!(!out.contains(&b'/'), "{ruleset}");
        }
    }

    #[test]
    fn test_utf8_repair_is_bytewise() {
        // 0xC3 0x28 is an invalid two byte sequence; "é" is valid
        let input = [b'a', 0xC3, 0x28, b'-', 0xC3, 0xA9];
        let out = sanitize_segment(&input, Ruleset::Apple);
        assert_eq!(out, [b'a', b'_', b'(', b'-', 0xC3, 0xA9]);

        let truncated = [b'x', 0xE2, 0x82];
        assert_eq!(sanitize_segment(&truncated, Ruleset::Windows), b"x__");
        assert_eq!(sanitize_segment(&truncated, Ruleset::Posix), truncated);
    }

    #[test]
    fn test_dos_latin1_folding() {
        assert_eq!(sanitize_segment(&[b'c', 0xE9, b't', 0xE9], Ruleset::Dos), b"cete");
        assert_eq!(sanitize_segment(&[0xF1, 0xEC], Ruleset::Dos), b"ni");
    }

    #[test]
    fn test_idempotence() {
        let samples: [&[u8]; 10] = [
            b"plain.txt",
            b"a\x01b*c",
            b"trailing. . ",
            b" . ",
            b"",
            b"..",
            &[0xFF, 0xFE, b'.', b' '],
            &[b'a', 0xC3, 0x28, 0xE9, b'.'],
            b"x/y\\z:w",
            &[0xE2, 0x82, b'?', b'.', b'.'],
        ];
        for ruleset in ALL {
            for sample in samples {
                let once = sanitize_segment(sample, ruleset);
                let twice = sanitize_segment(&once, ruleset);
                assert_eq!(once, twice, "{ruleset} {sample:?}");
                assert!(!once.is_empty());
            }
        }
    }
}
