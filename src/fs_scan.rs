use crate::hashing::hash_file;
use crate::paths::relative_key;
use crate::types::{CacheSnapshot, CachedDir, PlanItem};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Audio container được nhận mặc định.
pub const DEFAULT_INPUT_EXTENSIONS: &[&str] = &["flac", "mp3", "wav", "opus"];

/// Tập đuôi file (lowercase, không có dấu chấm).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionSet(BTreeSet<String>);

impl ExtensionSet {
    pub fn new<I, S>(exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ExtensionSet(
            exts.into_iter()
                .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// So sánh không phân biệt hoa thường
    pub fn matches(&self, p: &Path) -> bool {
        p.extension()
            .and_then(|s| s.to_str())
            .map(|ext| self.0.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ExtensionSet {
    fn default() -> Self {
        ExtensionSet::new(DEFAULT_INPUT_EXTENSIONS)
    }
}

/// Vì sao một file cần (hoặc không cần) xử lý lại.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Staleness {
    /// Chưa có record trong cache.
    Uncached,
    /// Có record nhưng không thấy output nào cùng stem.
    MissingOutput,
    /// Nội dung đã đổi so với digest đã lưu.
    ContentChanged,
    /// Không đọc được file để hash; vẫn đưa vào plan để lỗi được báo.
    Unreadable,
    UpToDate,
}

impl Staleness {
    pub fn is_stale(self) -> bool {
        self != Staleness::UpToDate
    }
}

/// Có ít nhất một file `<stem>.*` trong thư mục output mirror.
pub fn has_output_artifact(output_dir: &Path, stem: &str) -> bool {
    let Ok(entries) = fs::read_dir(output_dir) else {
        return false;
    };
    let prefix = format!("{stem}.");
    entries.filter_map(|e| e.ok()).any(|e| {
        e.file_name().to_str().is_some_and(|n| n.starts_with(&prefix)) && e.path().is_file()
    })
}

/// Quyết định staleness cho một file.
/// Chỉ hash khi đã có record và output (hash là phần tốn nhất).
pub fn assess(path: &Path, item: &PlanItem, dir: &CachedDir) -> Staleness {
    let Some(record) = dir.cache.get(&item.relative_path) else {
        return Staleness::Uncached;
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    if !has_output_artifact(&item.output_dir(), stem) {
        return Staleness::MissingOutput;
    }

    match hash_file(path) {
        Ok(current) if current == record.digest => Staleness::UpToDate,
        Ok(_) => Staleness::ContentChanged,
        Err(e) => {
            let error = format!("{e:#}");
            warn!(path = %path.display(), %error, "cannot hash file; scheduling it anyway");
            Staleness::Unreadable
        }
    }
}

/// Duyệt mọi input root trong cache, trả danh sách file cần xử lý
/// theo thứ tự walk.
/// Lỗi walk (kể cả ở root) chỉ log rồi bỏ qua.
pub fn build_plan(snapshot: &CacheSnapshot, eligible: &ExtensionSet) -> Vec<PlanItem> {
    let mut plan = Vec::new();

    for (input_root, dir) in &snapshot.directories {
        if !input_root.is_dir() {
            warn!(input = %input_root.display(), "cached input directory is missing; skipping");
            continue;
        }

        let mut seen = 0usize;
        let before = plan.len();

        for entry in WalkDir::new(input_root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(input = %input_root.display(), error = %e, "walk error; skipping entry");
                    continue;
                }
            };
            // Symlink tới file vẫn tính là file; symlink thư mục không đi theo.
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }

            let p = entry.path();
            if !eligible.matches(p) {
                continue;
            }

            let Some(relative_path) = relative_key(input_root, p) else {
                warn!(path = %p.display(), "path is not valid UTF-8; skipping");
                continue;
            };
            seen += 1;

            let item = PlanItem {
                input_root: input_root.clone(),
                output_root: dir.output_root.clone(),
                relative_path,
            };
            let status = assess(p, &item, dir);
            if status.is_stale() {
                debug!(path = %item.relative_path, reason = ?status, "scheduled");
                plan.push(item);
            }
        }

        info!(
            input = %input_root.display(),
            files = seen,
            stale = plan.len() - before,
            "scanned input directory"
        );
    }

    plan
}
