use crate::hashing::Digest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Schema version ghi vào cả config lẫn cache.
pub const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Txt,
    Vtt,
    Srt,
    Tsv,
    Json,
    /// Xuất tất cả format cho mỗi file.
    All,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Txt => "txt",
            OutputFormat::Vtt => "vtt",
            OutputFormat::Srt => "srt",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
            OutputFormat::All => "all",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub output_format: OutputFormat,
    pub temperature: f64,

    /// Thứ tự chỉ dùng để dựng prompt, không tham gia so sánh.
    #[serde(default)]
    pub glossary: Vec<String>,
}

impl GlobalSettings {
    pub fn glossary_matches(&self, other: &GlobalSettings) -> bool {
        let a: BTreeSet<&str> = self.glossary.iter().map(String::as_str).collect();
        let b: BTreeSet<&str> = other.glossary.iter().map(String::as_str).collect();
        a == b
    }

    /// Prompt gợi ý cho engine, dạng `(Glossary: a, b)`.
    pub fn initial_prompt(&self) -> Option<String> {
        let terms: Vec<&str> = self
            .glossary
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if terms.is_empty() {
            None
        } else {
            Some(format!("(Glossary: {})", terms.join(", ")))
        }
    }
}

impl PartialEq for GlobalSettings {
    fn eq(&self, other: &Self) -> bool {
        self.output_format == other.output_format
            && self.temperature == other.temperature
            && self.glossary_matches(other)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedDir {
    pub output_root: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Digest tại lần xử lý thành công gần nhất
    pub digest: Digest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDir {
    pub output_root: PathBuf,

    /// key = relative path, luôn dùng '/'
    #[serde(default)]
    pub cache: BTreeMap<String, CacheRecord>,
}

/// Config đọc lại mỗi lần chạy: nguồn sự thật cho *ý định*.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default = "schema_version")]
    pub version: u32,

    #[serde(flatten)]
    pub settings: GlobalSettings,

    /// key = input root (canonical sau khi load)
    #[serde(default)]
    pub directories: BTreeMap<PathBuf, TrackedDir>,

    /// Đuôi file audio được nhận; rỗng = bộ mặc định.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_extensions: Vec<String>,
}

/// Cache lưu trên đĩa: nguồn sự thật cho *lịch sử*.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default = "schema_version")]
    pub version: u32,

    #[serde(flatten)]
    pub settings: GlobalSettings,

    #[serde(default)]
    pub directories: BTreeMap<PathBuf, CachedDir>,
}

/// Một đơn vị công việc; không bao giờ được lưu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanItem {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub relative_path: String,
}

impl PlanItem {
    pub fn input_path(&self) -> PathBuf {
        self.input_root.join(&self.relative_path)
    }

    /// Thư mục output tương ứng (mirror cấu trúc input).
    pub fn output_dir(&self) -> PathBuf {
        let mirrored = self.output_root.join(&self.relative_path);
        mirrored
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.output_root.clone())
    }
}
