//! Shared fixtures for unit tests.

use crate::hashing::Digest;
use crate::paths::normalize_path;
use crate::types::{ConfigSnapshot, GlobalSettings, OutputFormat, SCHEMA_VERSION, TrackedDir};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub fn digest_of(bytes: &[u8]) -> Digest {
    Digest::from_hex(blake3::hash(bytes).to_hex().to_string())
}

pub fn settings(format: OutputFormat) -> GlobalSettings {
    GlobalSettings {
        output_format: format,
        temperature: 0.0,
        glossary: Vec::new(),
    }
}

/// Config dựng tay, path giữ nguyên (không đụng filesystem).
pub fn config_with(format: OutputFormat, dirs: &[(&str, &str)]) -> ConfigSnapshot {
    ConfigSnapshot {
        version: SCHEMA_VERSION,
        settings: settings(format),
        directories: dirs
            .iter()
            .map(|(input, output)| {
                (
                    PathBuf::from(input),
                    TrackedDir {
                        output_root: PathBuf::from(output),
                    },
                )
            })
            .collect(),
        input_extensions: Vec::new(),
    }
}

/// Một input root + output root thật trong thư mục tạm.
pub struct Workspace {
    _dir: TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = normalize_path(dir.path());
        let input = base.join("audio");
        let output = base.join("text");
        std::fs::create_dir_all(&input).unwrap();
        Workspace {
            _dir: dir,
            input,
            output,
        }
    }

    pub fn root(&self) -> &Path {
        self.input.parent().unwrap()
    }

    pub fn write_audio(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.input.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Giả lập output đã có cho `rel` (cùng stem, đuôi `ext`).
    pub fn write_output(&self, rel: &str, ext: &str) -> PathBuf {
        let mirrored = self.output.join(rel).with_extension(ext);
        std::fs::create_dir_all(mirrored.parent().unwrap()).unwrap();
        std::fs::write(&mirrored, b"transcript").unwrap();
        mirrored
    }

    pub fn config(&self, format: OutputFormat) -> ConfigSnapshot {
        let mut cfg = config_with(format, &[]);
        cfg.directories.insert(
            self.input.clone(),
            TrackedDir {
                output_root: self.output.clone(),
            },
        );
        cfg
    }
}
