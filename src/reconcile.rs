//! Reconcile a freshly loaded config against the previous cache snapshot.
//!
//! Settings drift (temperature, glossary) and per-directory drift (new
//! directory, changed output root) are resolved in favour of the config.
//! Output format drift cannot be resolved without discarding every record,
//! so it is returned as [`IncoherentCache`] and the caller decides.

use crate::paths::normalize_path;
use crate::types::{
    CacheSnapshot, CachedDir, ConfigSnapshot, OutputFormat, SCHEMA_VERSION, TrackedDir,
};
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IncoherenceReason {
    #[error("output format changed from {cached} to {configured}")]
    FormatChanged {
        cached: OutputFormat,
        configured: OutputFormat,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cache is incoherent with the configuration: {reason}")]
pub struct IncoherentCache {
    pub reason: IncoherenceReason,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cache rebuild declined ({reason}); nothing was processed")]
pub struct RebuildDeclined {
    pub reason: IncoherenceReason,
}

/// Everything reconciliation changed or noticed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    /// The snapshot was built from scratch (no prior cache, or a confirmed rebuild).
    pub fresh: bool,
    /// `(cached, configured)` when the temperature changed.
    pub temperature: Option<(f64, f64)>,
    pub glossary_changed: bool,
    /// Input roots tracked for the first time.
    pub added: Vec<PathBuf>,
    /// Input roots whose output root moved; their records were dropped.
    pub reset: Vec<PathBuf>,
    /// Input roots kept from history but no longer configured.
    pub untracked: Vec<PathBuf>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        !self.fresh
            && self.temperature.is_none()
            && !self.glossary_changed
            && self.added.is_empty()
            && self.reset.is_empty()
    }
}

pub fn reconcile(
    config: &ConfigSnapshot,
    prior: Option<CacheSnapshot>,
) -> Result<CacheSnapshot, IncoherentCache> {
    reconcile_with_report(config, prior).map(|(snapshot, _)| snapshot)
}

pub fn reconcile_with_report(
    config: &ConfigSnapshot,
    prior: Option<CacheSnapshot>,
) -> Result<(CacheSnapshot, ReconcileReport), IncoherentCache> {
    let Some(mut cache) = prior else {
        return Ok(fresh_snapshot(config));
    };
    let mut report = ReconcileReport::default();

    if cache.settings.output_format != config.settings.output_format {
        warn!(
            cached = %cache.settings.output_format,
            configured = %config.settings.output_format,
            "output format differs; cache must be rebuilt"
        );
        return Err(IncoherentCache {
            reason: IncoherenceReason::FormatChanged {
                cached: cache.settings.output_format,
                configured: config.settings.output_format,
            },
        });
    }

    if cache.settings.temperature != config.settings.temperature {
        warn!(
            cached = cache.settings.temperature,
            configured = config.settings.temperature,
            "temperature differs; using configured value"
        );
        report.temperature = Some((cache.settings.temperature, config.settings.temperature));
        cache.settings.temperature = config.settings.temperature;
    }

    if !cache.settings.glossary_matches(&config.settings) {
        warn!(
            cached = ?cache.settings.glossary,
            configured = ?config.settings.glossary,
            "glossary differs; using configured glossary"
        );
        report.glossary_changed = true;
        cache.settings.glossary = config.settings.glossary.clone();
    } else {
        // giữ thứ tự mới cho prompt
        cache.settings.glossary = config.settings.glossary.clone();
    }

    for (input_root, tracked) in &config.directories {
        let input_root = normalize_path(input_root);
        let configured_output = normalize_path(&tracked.output_root);

        match cache.directories.get(&input_root) {
            None => {
                info!(input = %input_root.display(), "new transcription input directory; adding to cache");
                cache.directories.insert(
                    input_root.clone(),
                    CachedDir::elevate(&TrackedDir {
                        output_root: configured_output,
                    }),
                );
                report.added.push(input_root);
            }
            Some(existing) => {
                let cached_output = normalize_path(&existing.output_root);
                if cached_output != configured_output {
                    warn!(
                        input = %input_root.display(),
                        cached_output = %cached_output.display(),
                        configured_output = %configured_output.display(),
                        dropped_records = existing.cache.len(),
                        "output root changed; existing outputs may be overwritten and this directory's cache is reset"
                    );
                    cache.directories.insert(
                        input_root.clone(),
                        CachedDir::elevate(&TrackedDir {
                            output_root: configured_output,
                        }),
                    );
                    report.reset.push(input_root);
                }
            }
        }
    }

    let configured: Vec<PathBuf> = config.directories.keys().map(|p| normalize_path(p)).collect();
    for (root, dir) in &cache.directories {
        if !configured.contains(root) {
            debug!(
                input = %root.display(),
                records = dir.cache.len(),
                "directory no longer configured; keeping its history"
            );
            report.untracked.push(root.clone());
        }
    }

    cache.version = SCHEMA_VERSION;
    Ok((cache, report))
}

fn fresh_snapshot(config: &ConfigSnapshot) -> (CacheSnapshot, ReconcileReport) {
    let mut cache = CacheSnapshot::elevate(config);
    cache.directories = cache
        .directories
        .into_iter()
        .map(|(root, mut dir)| {
            dir.output_root = normalize_path(&dir.output_root);
            (normalize_path(&root), dir)
        })
        .collect();
    let report = ReconcileReport {
        fresh: true,
        added: cache.directories.keys().cloned().collect(),
        ..Default::default()
    };
    (cache, report)
}

/// Reconcile, and on output format drift ask `confirm` whether the whole
/// cache may be discarded. Declining leaves the persisted cache untouched.
pub fn reconcile_or_rebuild<F>(
    config: &ConfigSnapshot,
    prior: Option<CacheSnapshot>,
    mut confirm: F,
) -> Result<(CacheSnapshot, ReconcileReport), RebuildDeclined>
where
    F: FnMut(&str) -> bool,
{
    match reconcile_with_report(config, prior) {
        Ok(done) => Ok(done),
        Err(IncoherentCache { reason }) => match reason {
            IncoherenceReason::FormatChanged { .. } => {
                let question = format!("{reason}. Erase cache and reprocess all input files?");
                if confirm(&question) {
                    warn!("cache erased; every input file will be reprocessed");
                    Ok(fresh_snapshot(config))
                } else {
                    Err(RebuildDeclined { reason })
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::save_cache;
    use crate::test_support::{Workspace, config_with, digest_of};
    use crate::types::{CacheRecord, PlanItem};
    use std::path::Path;

    fn seeded(ws: &Workspace, format: OutputFormat) -> CacheSnapshot {
        let mut cache = reconcile(&ws.config(format), None).unwrap();
        for rel in ["a.wav", "b.wav"] {
            let item = PlanItem {
                input_root: ws.input.clone(),
                output_root: ws.output.clone(),
                relative_path: rel.to_string(),
            };
            assert!(cache.record(&item, digest_of(rel.as_bytes())));
        }
        cache
    }

    fn records(cache: &CacheSnapshot, root: &Path) -> Vec<(String, CacheRecord)> {
        cache.directories[root]
            .cache
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[test]
    fn no_prior_elevates_config() {
        let ws = Workspace::new();
        let (cache, report) = reconcile_with_report(&ws.config(OutputFormat::Txt), None).unwrap();
        assert!(report.fresh);
        assert_eq!(report.added, vec![ws.input.clone()]);
        assert!(cache.directories[&ws.input].cache.is_empty());
        assert_eq!(cache.directories[&ws.input].output_root, ws.output);
    }

    #[test]
    fn format_drift_is_rejected() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let err = reconcile(&ws.config(OutputFormat::Srt), Some(prior)).unwrap_err();
        assert_eq!(
            err.reason,
            IncoherenceReason::FormatChanged {
                cached: OutputFormat::Txt,
                configured: OutputFormat::Srt,
            }
        );
    }

    #[test]
    fn temperature_and_glossary_drift_are_adopted() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let before = records(&prior, &ws.input);

        let mut config = ws.config(OutputFormat::Txt);
        config.settings.temperature = 0.6;
        config.settings.glossary = vec!["Zigbee".to_string(), "Matter".to_string()];

        let (cache, report) = reconcile_with_report(&config, Some(prior)).unwrap();
        assert_eq!(cache.settings.temperature, 0.6);
        assert_eq!(cache.settings.glossary, config.settings.glossary);
        assert_eq!(report.temperature, Some((0.0, 0.6)));
        assert!(report.glossary_changed);
        assert_eq!(records(&cache, &ws.input), before);
    }

    #[test]
    fn reordered_glossary_is_not_drift() {
        let ws = Workspace::new();
        let mut prior = seeded(&ws, OutputFormat::Txt);
        prior.settings.glossary = vec!["a".to_string(), "b".to_string()];
        let mut config = ws.config(OutputFormat::Txt);
        config.settings.glossary = vec!["b".to_string(), "a".to_string()];

        let (_, report) = reconcile_with_report(&config, Some(prior)).unwrap();
        assert!(!report.glossary_changed);
        assert!(report.is_clean());
    }

    #[test]
    fn output_root_drift_resets_only_that_directory() {
        let ws = Workspace::new();
        let other = ws.root().join("podcasts");
        std::fs::create_dir_all(&other).unwrap();

        let mut config = ws.config(OutputFormat::Txt);
        config.directories.insert(
            other.clone(),
            crate::types::TrackedDir {
                output_root: ws.root().join("podcast_text"),
            },
        );
        let mut prior = seeded(&ws, OutputFormat::Txt);
        prior.directories.insert(
            other.clone(),
            CachedDir {
                output_root: ws.root().join("podcast_text"),
                cache: [("ep1.mp3".to_string(), CacheRecord { digest: digest_of(b"ep1") })]
                    .into_iter()
                    .collect(),
            },
        );

        let moved = ws.root().join("text_v2");
        config
            .directories
            .get_mut(&ws.input)
            .unwrap()
            .output_root = moved.clone();

        let (cache, report) = reconcile_with_report(&config, Some(prior)).unwrap();
        assert_eq!(report.reset, vec![ws.input.clone()]);
        assert_eq!(cache.directories[&ws.input].output_root, moved);
        assert!(cache.directories[&ws.input].cache.is_empty());
        assert_eq!(cache.directories[&other].cache.len(), 1);
    }

    #[test]
    fn equivalent_output_spelling_is_not_drift() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let mut config = ws.config(OutputFormat::Txt);
        config.directories.get_mut(&ws.input).unwrap().output_root =
            ws.root().join("audio").join("..").join("text");

        let (cache, report) = reconcile_with_report(&config, Some(prior)).unwrap();
        assert!(report.reset.is_empty());
        assert_eq!(cache.directories[&ws.input].cache.len(), 2);
    }

    #[test]
    fn input_spellings_reconcile_to_one_entry() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let mut config = config_with(OutputFormat::Txt, &[]);
        config.directories.insert(
            ws.input.join(".").join("nested").join(".."),
            crate::types::TrackedDir {
                output_root: ws.output.clone(),
            },
        );

        let (cache, report) = reconcile_with_report(&config, Some(prior)).unwrap();
        assert!(report.added.is_empty());
        assert_eq!(cache.directories.len(), 1);
        assert_eq!(cache.directories[&ws.input].cache.len(), 2);
    }

    #[test]
    fn new_directory_is_added_with_empty_history() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let extra = ws.root().join("interviews");
        std::fs::create_dir_all(&extra).unwrap();
        let mut config = ws.config(OutputFormat::Txt);
        config.directories.insert(
            extra.clone(),
            crate::types::TrackedDir {
                output_root: ws.root().join("interview_text"),
            },
        );

        let (cache, report) = reconcile_with_report(&config, Some(prior)).unwrap();
        assert_eq!(report.added, vec![extra.clone()]);
        assert!(cache.directories[&extra].cache.is_empty());
        assert_eq!(cache.directories[&ws.input].cache.len(), 2);
    }

    #[test]
    fn unconfigured_directories_are_retained() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let config = config_with(OutputFormat::Txt, &[]);

        let (cache, report) = reconcile_with_report(&config, Some(prior)).unwrap();
        assert_eq!(report.untracked, vec![ws.input.clone()]);
        assert_eq!(cache.directories[&ws.input].cache.len(), 2);
    }

    #[test]
    fn declined_rebuild_keeps_persisted_cache() {
        let ws = Workspace::new();
        let cache_path = ws.root().join("transcription_cache.json");
        let prior = seeded(&ws, OutputFormat::Txt);
        save_cache(&cache_path, &prior).unwrap();
        let before = std::fs::read_to_string(&cache_path).unwrap();

        let mut asked = Vec::new();
        let err = reconcile_or_rebuild(&ws.config(OutputFormat::Json), Some(prior), |q| {
            asked.push(q.to_string());
            false
        })
        .unwrap_err();

        assert!(matches!(err.reason, IncoherenceReason::FormatChanged { .. }));
        assert_eq!(asked.len(), 1);
        assert!(asked[0].contains("Erase cache"));
        assert_eq!(std::fs::read_to_string(&cache_path).unwrap(), before);
    }

    #[test]
    fn confirmed_rebuild_starts_from_empty_history() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let (cache, report) =
            reconcile_or_rebuild(&ws.config(OutputFormat::Json), Some(prior), |_| true).unwrap();

        assert!(report.fresh);
        assert_eq!(cache.settings.output_format, OutputFormat::Json);
        assert!(cache.directories[&ws.input].cache.is_empty());
    }

    #[test]
    fn confirm_is_not_consulted_without_drift() {
        let ws = Workspace::new();
        let prior = seeded(&ws, OutputFormat::Txt);
        let (cache, _) = reconcile_or_rebuild(&ws.config(OutputFormat::Txt), Some(prior), |_| {
            panic!("no question expected")
        })
        .unwrap();
        assert_eq!(cache.directories[&ws.input].cache.len(), 2);
    }
}
