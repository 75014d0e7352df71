//! Virtual path from the volume root to the directory being visited
use std::borrow::Cow;
use std::fmt;

use crate::error::WalkError;

/// Capacity of a virtual path in bytes
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    bytes: Vec<u8>,
    capacity: usize,
}

impl VirtualPath {
    /// The volume root, `/`
    pub fn root() -> Self {
        Self::with_capacity(MAX_PATH_LEN)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut bytes = Vec::with_capacity(capacity.min(256));
        bytes.push(b'/');
        Self { bytes, capacity }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_root(&self) -> bool {
        self.bytes == b"/"
    }

    /// Append a `/segment` and return the length to restore afterwards
    ///
    /// Nothing is written when the result would not fit.
    pub fn push(&mut self, segment: &[u8]) -> Result<usize, WalkError> {
        let restore_len = self.bytes.len();
        let len = restore_len + 1 + segment.len();
        if len > self.capacity {
            return Err(WalkError::PathTooLong {
                len,
                capacity: self.capacity,
            });
        }

        if !self.is_root() {
            self.bytes.push(b'/');
        }
        self.bytes.extend_from_slice(segment);
        Ok(restore_len)
    }

    /// Restore a length previously returned by [`push`](Self::push)
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len.max(1));
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl Default for VirtualPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_truncate() {
        let mut path = VirtualPath::root();
        let at_root = path.push(b"home").unwrap();
        assert_eq!(path.as_bytes(), b"/home");
        let at_home = path.push(b"user").unwrap();
        assert_eq!(path.to_string(), "/home/user");

        path.truncate(at_home);
        assert_eq!(path.as_bytes(), b"/home");
        path.truncate(at_root);
        assert!(path.is_root());
    }

    #[test]
    fn test_capacity_is_never_exceeded() {
        let mut path = VirtualPath::with_capacity(9);
        path.push(b"abcd").unwrap();
        assert_eq!(path.len(), 5);

        let err = path.push(b"efgh").unwrap_err();
        assert!(matches!(err, WalkError::PathTooLong { len: 10, capacity: 9 }));
        assert_eq!(path.as_bytes(), b"/abcd");

        path.push(b"efg").unwrap();
        assert_eq!(path.as_bytes(), b"/abcd/efg");
        assert!(path.len() <= path.capacity());
    }

    #[test]
    fn test_truncate_keeps_root() {
        let mut path = VirtualPath::root();
        path.truncate(0);
        assert!(path.is_root());
    }
}
