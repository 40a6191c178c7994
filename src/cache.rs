use crate::error::CacheError;
use crate::hashing::Digest;
use crate::types::{
    CacheRecord, CacheSnapshot, CachedDir, ConfigSnapshot, PlanItem, SCHEMA_VERSION, TrackedDir,
};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

impl CachedDir {
    /// TrackedDir -> CachedDir với lịch sử rỗng.
    pub fn elevate(tracked: &TrackedDir) -> Self {
        CachedDir {
            output_root: tracked.output_root.clone(),
            cache: BTreeMap::new(),
        }
    }
}

impl CacheSnapshot {
    /// Dựng cache rỗng từ config: lần chạy đầu hoặc khi phải rebuild toàn bộ.
    pub fn elevate(config: &ConfigSnapshot) -> Self {
        CacheSnapshot {
            version: SCHEMA_VERSION,
            settings: config.settings.clone(),
            directories: config
                .directories
                .iter()
                .map(|(root, tracked)| (root.clone(), CachedDir::elevate(tracked)))
                .collect(),
        }
    }

    /// Ghi (hoặc ghi đè) record cho một plan item đã xử lý xong.
    /// Trả false nếu input root không còn trong cache.
    pub fn record(&mut self, item: &PlanItem, digest: Digest) -> bool {
        match self.directories.get_mut(&item.input_root) {
            Some(dir) => {
                dir.cache
                    .insert(item.relative_path.clone(), CacheRecord { digest });
                true
            }
            None => false,
        }
    }

    /// Bỏ lịch sử của một input root.
    pub fn forget(&mut self, input_root: &Path) -> Option<CachedDir> {
        self.directories.remove(input_root)
    }
}

/// None nếu chưa có cache (lần chạy đầu).
/// File có nhưng hỏng => lỗi, KHÔNG coi như chưa có.
pub fn load_cache(path: &Path) -> Result<Option<CacheSnapshot>, CacheError> {
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let snapshot: CacheSnapshot = serde_json::from_str(&s).map_err(|e| CacheError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if snapshot.version > SCHEMA_VERSION {
        return Err(CacheError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: snapshot.version,
            supported: SCHEMA_VERSION,
        });
    }

    Ok(Some(snapshot))
}

/// Ghi toàn bộ snapshot: file tạm cùng thư mục -> fsync -> rename đè.
/// Crash giữa chừng chỉ để lại bản cũ hoặc bản mới, không bao giờ lẫn.
pub fn save_cache(path: &Path, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| CacheError::Io {
        path: parent.clone(),
        source: e,
    })?;

    let s = serde_json::to_string_pretty(snapshot).map_err(|e| CacheError::Serialize {
        reason: e.to_string(),
    })?;

    let io_err = |source: std::io::Error| CacheError::Io {
        path: parent.clone(),
        source,
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".transcription_cache")
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(io_err)?;
    tmp.write_all(s.as_bytes()).map_err(io_err)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    tmp.persist(path).map_err(|e| CacheError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
