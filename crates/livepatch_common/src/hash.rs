//! Content hashing for class-file change detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit content hash computed using XXH3.
///
/// Two class files with the same `ContentHash` are assumed to be byte-identical,
/// which lets the differ skip structural comparison entirely.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentHash::from_bytes(&[0xca, 0xfe, 0xba, 0xbe]);
        let b = ContentHash::from_bytes(&[0xca, 0xfe, 0xba, 0xbe]);
        assert_eq!(a, b);
    }

    #[test]
    fn single_byte_change_differs() {
        let a = ContentHash::from_bytes(&[0xca, 0xfe, 0xba, 0xbe, 0x00]);
        let b = ContentHash::from_bytes(&[0xca, 0xfe, 0xba, 0xbe, 0x01]);
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_hex() {
        let h = ContentHash::from_bytes(b"class bytes");
        let s = format!("{h}");
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_abbreviated() {
        let s = format!("{:?}", ContentHash::from_bytes(b"x"));
        assert!(s.starts_with("ContentHash("));
        assert!(s.ends_with("..)"));
    }

    #[test]
    fn serde_roundtrip() {
        let h = ContentHash::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
