//! Speech-to-text engine boundary.
//!
//! The execution loop only sees [`Transcriber`] and [`OutputWriter`]. The
//! shipped binding drives the `whisper` command line tool, which renders the
//! requested formats itself into a scratch directory; [`ArtifactWriter`] then
//! copies those files into the mirrored output directory.

use crate::types::{GlobalSettings, OutputFormat};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::debug;

/// Số ký tự cuối của stderr giữ lại trong thông báo lỗi.
const STDERR_TAIL: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("engine produced no {format} output for {path}")]
    NoArtifacts { path: PathBuf, format: OutputFormat },

    #[error("engine I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl EngineError {
    /// Phân loại ngắn gọn để log.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Spawn { .. } => "spawn",
            EngineError::Failed { .. } => "engine-exit",
            EngineError::NoArtifacts { .. } => "no-output",
            EngineError::Io { .. } => "io",
        }
    }
}

/// Kết quả của engine: các file đã render, nằm trong thư mục tạm
/// thuộc sở hữu của Transcript (xoá khi drop).
#[derive(Debug)]
pub struct Transcript {
    pub artifacts: Vec<PathBuf>,
    _scratch: Option<TempDir>,
}

impl Transcript {
    pub fn new(artifacts: Vec<PathBuf>, scratch: Option<TempDir>) -> Self {
        Transcript {
            artifacts,
            _scratch: scratch,
        }
    }
}

pub trait Transcriber {
    fn transcribe(
        &mut self,
        audio: &Path,
        settings: &GlobalSettings,
    ) -> Result<Transcript, EngineError>;
}

pub trait OutputWriter {
    /// Ghi transcript vào `output_dir`, trả về các file đã ghi.
    fn write(
        &mut self,
        transcript: &Transcript,
        audio: &Path,
        output_dir: &Path,
        format: OutputFormat,
    ) -> Result<Vec<PathBuf>, EngineError>;
}

/// Gọi `whisper` CLI cho từng file.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    pub program: String,
    pub model: String,
    pub language: Option<String>,
}

impl WhisperCli {
    fn command(&self, audio: &Path, settings: &GlobalSettings, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(audio)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_format")
            .arg(settings.output_format.as_str())
            .arg("--output_dir")
            .arg(out_dir)
            .arg("--temperature")
            .arg(settings.temperature.to_string())
            .arg("--verbose")
            .arg("False");
        if let Some(prompt) = settings.initial_prompt() {
            cmd.arg("--initial_prompt").arg(prompt);
        }
        if let Some(lang) = &self.language {
            cmd.arg("--language").arg(lang);
        }
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl Transcriber for WhisperCli {
    fn transcribe(
        &mut self,
        audio: &Path,
        settings: &GlobalSettings,
    ) -> Result<Transcript, EngineError> {
        let scratch = tempfile::Builder::new()
            .prefix("transcribe_sync")
            .tempdir()
            .map_err(|e| EngineError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;

        let mut cmd = self.command(audio, settings, scratch.path());
        debug!(command = ?cmd, "running engine");
        let out = cmd.output().map_err(|e| EngineError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let stderr = stderr.trim();
            let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
                Some((i, _)) => &stderr[i..],
                None => stderr,
            };
            return Err(EngineError::Failed {
                program: self.program.clone(),
                status: out.status.to_string(),
                stderr: tail.to_string(),
            });
        }

        let stem = audio
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let artifacts = list_artifacts(scratch.path(), stem)?;
        if artifacts.is_empty() {
            return Err(EngineError::NoArtifacts {
                path: audio.to_path_buf(),
                format: settings.output_format,
            });
        }

        Ok(Transcript::new(artifacts, Some(scratch)))
    }
}

/// Các file `<stem>.*` trong `dir`, sort theo tên.
fn list_artifacts(dir: &Path, stem: &str) -> Result<Vec<PathBuf>, EngineError> {
    let prefix = format!("{stem}.");
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut out: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    out.sort();
    Ok(out)
}

fn extension_matches(path: &Path, format: OutputFormat) -> bool {
    match format {
        OutputFormat::All => true,
        f => path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(f.as_str())),
    }
}

/// Copy artifact của engine vào thư mục output mirror, giữ tên file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactWriter;

impl OutputWriter for ArtifactWriter {
    fn write(
        &mut self,
        transcript: &Transcript,
        audio: &Path,
        output_dir: &Path,
        format: OutputFormat,
    ) -> Result<Vec<PathBuf>, EngineError> {
        std::fs::create_dir_all(output_dir).map_err(|e| EngineError::Io {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let mut written = Vec::new();
        for src in transcript
            .artifacts
            .iter()
            .filter(|p| extension_matches(p, format))
        {
            let Some(name) = src.file_name() else {
                continue;
            };
            let dst = output_dir.join(name);
            std::fs::copy(src, &dst).map_err(|e| EngineError::Io {
                path: dst.clone(),
                source: e,
            })?;
            written.push(dst);
        }

        if written.is_empty() {
            return Err(EngineError::NoArtifacts {
                path: audio.to_path_buf(),
                format,
            });
        }
        Ok(written)
    }
}
