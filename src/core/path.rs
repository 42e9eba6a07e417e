// src/core/path.rs

//! Maps a key to its on-disk location. Modeled as a small sum type rather
//! than a trait object, per the two fixed variants the protocol supports.

use crate::config::PathTransformKind;
use sha1::{Digest, Sha1};
use std::path::PathBuf;

const CHUNK_SIZE: usize = 10;

/// Pure `(key) -> relative directory` mapping. `base` does not influence the
/// result; it only determines where the returned path is joined on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTransform {
    /// `<base>/<key>/<key>`. Intended for tests, not production use.
    Identity,
    /// SHA-1 of the key, hex-encoded, split into four 10-character chunks.
    ContentAddressable,
}

impl PathTransform {
    pub fn from_kind(kind: PathTransformKind) -> Self {
        match kind {
            PathTransformKind::Identity => PathTransform::Identity,
            PathTransformKind::ContentAddressable => PathTransform::ContentAddressable,
        }
    }

    /// The directory a key's blob lives under, relative to the store's base.
    pub fn relative_dir(&self, key: &str) -> PathBuf {
        match self {
            PathTransform::Identity => PathBuf::from(key),
            PathTransform::ContentAddressable => {
                let digest = Sha1::digest(key.as_bytes());
                let hex = hex::encode(digest);
                let mut path = PathBuf::new();
                for chunk in chunk_str(&hex, CHUNK_SIZE) {
                    path.push(chunk);
                }
                path
            }
        }
    }

    /// The full path of a key's blob, `<base>/<relative_dir>/<key>`.
    pub fn full_path(&self, base: &std::path::Path, key: &str) -> PathBuf {
        base.join(self.relative_dir(key)).join(key)
    }
}

/// Splits `s` into `block_size`-sized chunks. The final chunk is shorter if
/// `s.len()` isn't a multiple of `block_size`; it is never padded.
fn chunk_str(s: &str, block_size: usize) -> Vec<&str> {
    debug_assert!(block_size > 0);
    let bytes = s.as_bytes();
    let mut chunks = Vec::with_capacity(bytes.len().div_ceil(block_size));
    let mut start = 0;
    while start < bytes.len() {
        let end = (start + block_size).min(bytes.len());
        chunks.push(&s[start..end]);
        start = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_addressable_path_matches_sha1_of_key() {
        let transform = PathTransform::ContentAddressable;
        let dir = transform.relative_dir("hello");
        let expected_hex = hex::encode(Sha1::digest(b"hello"));
        let expected: PathBuf = chunk_str(&expected_hex, CHUNK_SIZE).into_iter().collect();
        assert_eq!(dir, expected);
    }

    #[test]
    fn content_addressable_has_four_ten_char_components() {
        let transform = PathTransform::ContentAddressable;
        let dir = transform.relative_dir("any-key-at-all");
        let components: Vec<_> = dir.components().collect();
        assert_eq!(components.len(), 4);
        for c in components {
            let s = c.as_os_str().to_str().unwrap();
            assert_eq!(s.len(), 10);
            assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn identity_returns_key_unchanged() {
        let transform = PathTransform::Identity;
        assert_eq!(transform.relative_dir("my-key"), PathBuf::from("my-key"));
    }

    #[test]
    fn transform_is_deterministic() {
        let transform = PathTransform::ContentAddressable;
        assert_eq!(transform.relative_dir("repeat"), transform.relative_dir("repeat"));
    }

    #[test]
    fn chunking_never_pads_the_final_chunk() {
        assert_eq!(chunk_str("abcdefghij1234", 10), vec!["abcdefghij", "1234"]);
    }
}
