use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Đọc theo block 128KB, không load cả file vào RAM.
const READ_CHUNK: usize = 128 * 1024;

/// BLAKE3 digest của nội dung file, dạng hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Digest(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn hash_file(path: &Path) -> Result<Digest> {
    let mut f = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Digest::from_hex(hasher.finalize().to_hex().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        std::fs::write(&a, b"RIFF....WAVE").unwrap();
        std::fs::write(&b, b"RIFF....WAVE").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn digest_matches_one_shot_hash_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.flac");
        let bytes: Vec<u8> = (0..(READ_CHUNK * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();

        let expected = blake3::hash(&bytes).to_hex().to_string();
        assert_eq!(hash_file(&path).unwrap().as_str(), expected);
    }

    #[test]
    fn content_change_changes_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.mp3");
        std::fs::write(&path, b"first take").unwrap();
        let before = hash_file(&path).unwrap();
        std::fs::write(&path, b"second take").unwrap();
        assert_ne!(before, hash_file(&path).unwrap());
    }

    #[test]
    fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash_file(&dir.path().join("gone.opus")).is_err());
    }

    #[test]
    fn from_hex_normalizes_case() {
        assert_eq!(Digest::from_hex("ABCdef").as_str(), "abcdef");
    }
}
