use crate::cache::{load_cache, save_cache};
use crate::config::load_config;
use crate::fs_scan::build_plan;
use crate::hashing::hash_file;
use crate::paths::normalize_path;
use crate::reconcile::{ReconcileReport, reconcile, reconcile_or_rebuild, reconcile_with_report};
use crate::transcribe::{ArtifactWriter, OutputWriter, Transcriber, WhisperCli};
use crate::types::{CacheSnapshot, PlanItem};

use anyhow::{Context, Result, bail};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub struct AppConfig {
    pub config_path: PathBuf,
    pub cache_path: PathBuf,

    /// Trả lời "yes" cho mọi câu hỏi xác nhận.
    pub assume_yes: bool,
}

/// Tham số cho engine `whisper`.
pub struct EngineOptions {
    pub program: String,
    pub model: String,
    pub language: Option<String>,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub processed: usize,
    /// (file, lỗi) cho các item thất bại; chúng vẫn stale cho lần chạy sau.
    pub failed: Vec<(PathBuf, String)>,
}

/* =========================
   Confirmation
   ========================= */

/// Chỉ "y"/"yes" mới là đồng ý; mọi thứ khác (kể cả EOF) là không.
pub fn parse_confirmation(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub fn confirm_stdin(question: &str) -> bool {
    print!("{question} (y/N) ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => parse_confirmation(&line),
    }
}

/* =========================
   Commands
   ========================= */

/// In plan, KHÔNG ghi cache.
pub fn plan(cfg: &AppConfig) -> Result<()> {
    let loaded = load_config(&cfg.config_path)
        .with_context(|| format!("load config {}", cfg.config_path.display()))?;
    let prior = load_cache(&cfg.cache_path)?;

    let cache = match reconcile(&loaded.snapshot, prior) {
        Ok(c) => c,
        Err(e) => {
            println!("{e}");
            println!("`run` will ask to erase the cache; planning as if it were rebuilt.\n");
            reconcile(&loaded.snapshot, None)?
        }
    };

    let items = build_plan(&cache, &loaded.extensions);

    println!("=== RUN PLAN ===");
    println!("Format  : {}", cache.settings.output_format);
    println!(
        "Inputs  : {}",
        loaded.extensions.iter().collect::<Vec<_>>().join(", ")
    );
    println!("Files   : {}", items.len());
    for item in &items {
        println!("  - {}", item.input_path().display());
    }
    Ok(())
}

/// Reconcile, persist, plan và chạy engine `whisper`.
pub fn run(cfg: &AppConfig, engine: &EngineOptions) -> Result<RunReport> {
    let mut transcriber = WhisperCli {
        program: engine.program.clone(),
        model: engine.model.clone(),
        language: engine.language.clone(),
    };
    let assume_yes = cfg.assume_yes;
    run_with(cfg, &mut transcriber, &mut ArtifactWriter, |q| {
        assume_yes || confirm_stdin(q)
    })
}

pub fn run_with<T, W, F>(
    cfg: &AppConfig,
    transcriber: &mut T,
    writer: &mut W,
    confirm: F,
) -> Result<RunReport>
where
    T: Transcriber + ?Sized,
    W: OutputWriter + ?Sized,
    F: FnMut(&str) -> bool,
{
    let loaded = load_config(&cfg.config_path)
        .with_context(|| format!("load config {}", cfg.config_path.display()))?;
    let prior = load_cache(&cfg.cache_path)?;

    let (mut cache, drift) = reconcile_or_rebuild(&loaded.snapshot, prior, confirm)?;
    log_drift(&drift);
    save_cache(&cfg.cache_path, &cache)?;

    let items = build_plan(&cache, &loaded.extensions);
    println!("Planning complete. {} file(s) to process.", items.len());
    if items.is_empty() {
        return Ok(RunReport::default());
    }

    let report = execute_plan(&items, &mut cache, &cfg.cache_path, transcriber, writer)?;

    if report.failed.is_empty() {
        println!("DONE: success={}", report.processed);
    } else {
        println!(
            "DONE WITH ERRORS: success={}, failed={}",
            report.processed,
            report.failed.len()
        );
        for (p, err) in &report.failed {
            println!("  - {}\n    {}", p.display(), err);
        }
    }
    Ok(report)
}

/// In drift + số record cho từng thư mục, không ghi gì.
pub fn status(cfg: &AppConfig) -> Result<()> {
    let loaded = load_config(&cfg.config_path)
        .with_context(|| format!("load config {}", cfg.config_path.display()))?;
    let prior = load_cache(&cfg.cache_path)?;
    if prior.is_none() {
        println!("No cache at {} yet.", cfg.cache_path.display());
    }

    let (cache, drift) = match reconcile_with_report(&loaded.snapshot, prior) {
        Ok(done) => done,
        Err(e) => {
            println!("INCOHERENT: {e}");
            println!("`run` will ask before erasing the cache.");
            return Ok(());
        }
    };

    println!("=== STATUS ===");
    println!("Format      : {}", cache.settings.output_format);
    println!("Temperature : {}", cache.settings.temperature);
    if let Some((old, new)) = drift.temperature {
        println!("  (changed from {old} to {new})");
    }
    println!("Glossary    : {:?}", cache.settings.glossary);
    if drift.glossary_changed {
        println!("  (changed)");
    }

    println!("Directories :");
    for (root, dir) in &cache.directories {
        let note = if drift.added.contains(root) {
            " [new]"
        } else if drift.reset.contains(root) {
            " [output root changed, history will be dropped]"
        } else if drift.untracked.contains(root) {
            " [not configured, history kept]"
        } else {
            ""
        };
        println!(
            "  - {} -> {} ({} record(s)){}",
            root.display(),
            dir.output_root.display(),
            dir.cache.len(),
            note
        );
    }
    Ok(())
}

/// Xoá lịch sử của một thư mục đã bỏ khỏi config.
pub fn forget(cfg: &AppConfig, input_root: &Path) -> Result<()> {
    forget_with(cfg, input_root, |q| cfg.assume_yes || confirm_stdin(q))
}

pub fn forget_with<F>(cfg: &AppConfig, input_root: &Path, mut confirm: F) -> Result<()>
where
    F: FnMut(&str) -> bool,
{
    let loaded = load_config(&cfg.config_path)
        .with_context(|| format!("load config {}", cfg.config_path.display()))?;
    let root = normalize_path(input_root);
    if loaded.snapshot.directories.contains_key(&root) {
        bail!(
            "{} is still configured; remove it from {} first",
            root.display(),
            cfg.config_path.display()
        );
    }

    let Some(mut cache) = load_cache(&cfg.cache_path)? else {
        bail!("no cache at {}", cfg.cache_path.display());
    };
    let Some(dir) = cache.directories.get(&root) else {
        bail!("{} has no cached history", root.display());
    };

    let question = format!(
        "Forget {} cached record(s) for {}?",
        dir.cache.len(),
        root.display()
    );
    if !confirm(&question) {
        bail!("aborted; cache left unchanged");
    }

    cache.forget(&root);
    save_cache(&cfg.cache_path, &cache)?;
    println!("Forgot {}", root.display());
    Ok(())
}

fn log_drift(drift: &ReconcileReport) {
    if drift.fresh {
        info!(directories = drift.added.len(), "starting from an empty cache");
        return;
    }
    if drift.is_clean() {
        info!("cache is coherent with config");
    }
    for root in &drift.untracked {
        info!(input = %root.display(), "keeping history of unconfigured directory");
    }
}

/* =========================
   Execution loop
   ========================= */

/// Chạy tuần tự từng item. Thành công => ghi record + save cache ngay.
/// Item lỗi không được ghi record, được báo lại và vòng lặp tiếp tục.
///
/// Digest được tính TRƯỚC khi transcribe. Nếu file đổi trong lúc chạy,
/// record giữ digest cũ để lần sau file vẫn bị coi là stale.
pub fn execute_plan<T, W>(
    items: &[PlanItem],
    cache: &mut CacheSnapshot,
    cache_path: &Path,
    transcriber: &mut T,
    writer: &mut W,
) -> Result<RunReport>
where
    T: Transcriber + ?Sized,
    W: OutputWriter + ?Sized,
{
    let mut report = RunReport::default();
    let total = items.len();

    for (i, item) in items.iter().enumerate() {
        let audio = item.input_path();
        let output_dir = item.output_dir();
        info!(n = i + 1, total, path = %audio.display(), "processing");

        let before = match hash_file(&audio) {
            Ok(d) => d,
            Err(e) => {
                let msg = format!("{e:#}");
                error!(path = %audio.display(), kind = "hash", error = %msg, "skipping");
                report.failed.push((audio, msg));
                continue;
            }
        };

        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            error!(path = %output_dir.display(), kind = "io", error = %e, "cannot create output directory; skipping");
            report.failed.push((audio, e.to_string()));
            continue;
        }

        let outcome = transcriber
            .transcribe(&audio, &cache.settings)
            .and_then(|t| writer.write(&t, &audio, &output_dir, cache.settings.output_format));

        let written = match outcome {
            Ok(w) => w,
            Err(e) => {
                error!(
                    path = %audio.display(),
                    kind = e.kind(),
                    error = %e,
                    "transcription failed; file stays stale"
                );
                report.failed.push((audio, e.to_string()));
                continue;
            }
        };

        match hash_file(&audio) {
            Ok(after) if after != before => warn!(
                path = %audio.display(),
                "source changed while it was transcribed; it will be redone next run"
            ),
            Ok(_) => {}
            Err(e) => {
                let msg = format!("{e:#}");
                warn!(path = %audio.display(), error = %msg, "cannot re-hash source after transcription");
            }
        }

        if !cache.record(item, before) {
            warn!(input = %item.input_root.display(), "input root missing from cache; result not recorded");
        }
        save_cache(cache_path, cache)
            .with_context(|| format!("persist cache {}", cache_path.display()))?;

        info!(path = %audio.display(), outputs = written.len(), "done");
        report.processed += 1;
    }

    Ok(report)
}
