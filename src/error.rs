//! Error types for config loading and the cache store.

use std::path::PathBuf;

/// Errors raised while loading and validating the configuration document.
///
/// All of these are startup failures: nothing is processed when the
/// configuration is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("config {path} has schema version {found}, this build understands up to {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("temperature must be a finite, non-negative number (got {0})")]
    InvalidTemperature(f64),

    /// A configured input directory does not exist or is not a directory.
    #[error("configured input directory {0} is not a directory")]
    MissingInputDir(PathBuf),

    /// Two spellings of the same input directory ask for different outputs.
    #[error("input directory {input} is configured twice with different output roots ({first} vs {second})")]
    ConflictingDirectory {
        input: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("invalid input extension {0:?}")]
    InvalidExtension(String),
}

/// Errors raised by the persisted cache store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The cache file exists but is not a valid cache document. This is
    /// never downgraded to "no cache", which would silently drop history.
    #[error("failed to parse cache {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("failed to serialize cache: {reason}")]
    Serialize { reason: String },

    #[error("failed to replace cache {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache {path} has schema version {found}, this build understands up to {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_dir_names_the_path() {
        let err = ConfigError::MissingInputDir(PathBuf::from("/srv/audio/inbox"));
        assert!(err.to_string().contains("/srv/audio/inbox"));
    }

    #[test]
    fn conflicting_directory_lists_both_outputs() {
        let err = ConfigError::ConflictingDirectory {
            input: PathBuf::from("/in"),
            first: PathBuf::from("/out/a"),
            second: PathBuf::from("/out/b"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/out/a"));
        assert!(msg.contains("/out/b"));
    }

    #[test]
    fn cache_parse_display() {
        let err = CacheError::Parse {
            path: PathBuf::from("transcription_cache.json"),
            reason: "EOF while parsing an object".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("transcription_cache.json"));
        assert!(msg.contains("EOF"));
    }
}
