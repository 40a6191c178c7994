use crate::error::ConfigError;
use crate::fs_scan::ExtensionSet;
use crate::paths::normalize_path;
use crate::types::{ConfigSnapshot, SCHEMA_VERSION, TrackedDir};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Config đã validate: path tuyệt đối, input root canonical.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub snapshot: ConfigSnapshot,
    pub extensions: ExtensionSet,
}

/// Đọc config JSON hoặc YAML (theo đuôi file).
/// Path tương đối được tính từ thư mục chứa file config.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let raw = parse_config(path, &s)?;

    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    resolve(path, raw, &base)
}

fn parse_config(path: &Path, s: &str) -> Result<ConfigSnapshot, ConfigError> {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let parsed: Result<ConfigSnapshot, String> = if is_yaml {
        serde_yaml::from_str(s).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(s).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Validate + chuẩn hoá directories.
fn resolve(path: &Path, mut raw: ConfigSnapshot, base: &Path) -> Result<LoadedConfig, ConfigError> {
    if raw.version > SCHEMA_VERSION {
        return Err(ConfigError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: raw.version,
            supported: SCHEMA_VERSION,
        });
    }

    let temperature = raw.settings.temperature;
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(ConfigError::InvalidTemperature(temperature));
    }

    let mut directories: BTreeMap<PathBuf, TrackedDir> = BTreeMap::new();
    for (input, tracked) in std::mem::take(&mut raw.directories) {
        let input = normalize_path(&base.join(input));
        if !input.is_dir() {
            return Err(ConfigError::MissingInputDir(input));
        }
        let output_root = normalize_path(&base.join(&tracked.output_root));

        if let Some(existing) = directories.get(&input) {
            if existing.output_root != output_root {
                return Err(ConfigError::ConflictingDirectory {
                    input,
                    first: existing.output_root.clone(),
                    second: output_root,
                });
            }
            continue;
        }
        directories.insert(input, TrackedDir { output_root });
    }
    raw.directories = directories;

    for ext in &raw.input_extensions {
        let e = ext.trim().trim_start_matches('.');
        if e.is_empty() || e.contains(['/', '\\', '.']) {
            return Err(ConfigError::InvalidExtension(ext.clone()));
        }
    }
    let extensions = if raw.input_extensions.is_empty() {
        ExtensionSet::default()
    } else {
        ExtensionSet::new(&raw.input_extensions)
    };

    Ok(LoadedConfig {
        snapshot: raw,
        extensions,
    })
}
