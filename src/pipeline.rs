//! Batch driver: discover message files, decode and normalize them on a
//! bounded worker pool, and persist the corpus snapshots.
//!
//! Workers share nothing but a progress counter. Results are collected in
//! file-identifier order and written once per stage.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::PipelineConfig;
use crate::error::{panic_message, IngestError, Result};
use crate::export::{corpus, csv};
use crate::model::record::{NormalizedEmailRecord, RawEmailRecord};
use crate::normalize::normalize_record;
use crate::parser::eml;
use crate::report::RunSummary;

/// Progress callback: `(done, total)`. Called from worker threads.
pub type Progress<'a> = &'a (dyn Fn(u64, u64) + Sync);

/// Progress callback for [`run`]: `(stage, done, total)`.
pub type StageProgress<'a> = &'a (dyn Fn(Stage, u64, u64) + Sync);

/// Pipeline stage reported to a [`StageProgress`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Normalize,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Parse => "Parsing",
            Self::Normalize => "Normalizing",
        }
    }
}

/// A message file found under the corpus root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFile {
    /// Path relative to the corpus root, `/`-separated.
    pub id: String,
    pub path: PathBuf,
}

/// Output of the raw stage.
#[derive(Debug, Clone, Default)]
pub struct IngestRun {
    pub records: Vec<RawEmailRecord>,
    pub bytes_read: u64,
}

/// Output of a full two-stage run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub raw: Vec<RawEmailRecord>,
    pub normalized: Vec<NormalizedEmailRecord>,
    pub summary: RunSummary,
}

/// Recursively list message files under `root`, sorted by identifier.
///
/// A file qualifies when its name ends with `.<ext>` for one of
/// `extensions`, compared case-insensitively. Unreadable entries are
/// logged and skipped.
pub fn discover_messages(root: &Path, extensions: &[String]) -> Result<Vec<MessageFile>> {
    if !root.exists() {
        return Err(IngestError::InputNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(IngestError::NotADirectory(root.to_path_buf()));
    }

    let suffixes: Vec<String> = extensions
        .iter()
        .map(|e| format!(".{}", e.trim_start_matches('.').to_lowercase()))
        .collect();

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            continue;
        }

        files.push(MessageFile {
            id: file_id(root, entry.path()),
            path: entry.into_path(),
        });
    }

    files.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(files)
}

/// Raw stage: decode every message file under the configured root.
///
/// Always yields exactly one record per discovered file, in identifier order.
pub fn ingest(config: &PipelineConfig, progress: Option<Progress<'_>>) -> Result<IngestRun> {
    let files = discover_messages(&config.input_dir, &config.extensions)?;
    info!(
        root = %config.input_dir.display(),
        count = files.len(),
        "Discovered message files"
    );

    let pool = worker_pool(config.workers)?;
    let total = files.len() as u64;
    let done = AtomicU64::new(0);

    // `collect` on an indexed parallel iterator keeps input order.
    let outcomes: Vec<_> = pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                let result = eml::assemble_file(&file.id, &file.path, config.max_message_size);
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(report) = progress {
                    report(finished, total);
                }
                result
            })
            .collect()
    });

    let bytes_read = outcomes.iter().map(|(_, bytes)| bytes).sum();
    let records: Vec<RawEmailRecord> = outcomes
        .into_iter()
        .map(|(outcome, _)| outcome.into_record())
        .collect();

    info!(
        records = records.len(),
        failed = records.iter().filter(|r| r.is_error()).count(),
        "Raw stage complete"
    );
    Ok(IngestRun {
        records,
        bytes_read,
    })
}

/// Normalized stage: one normalized record per raw record, same order.
///
/// A panic while normalizing one record is contained to that record, which
/// comes out with only `file` and `error` set.
pub fn normalize_all(
    records: &[RawEmailRecord],
    workers: usize,
    progress: Option<Progress<'_>>,
) -> Result<Vec<NormalizedEmailRecord>> {
    let pool = worker_pool(workers)?;
    let total = records.len() as u64;
    let done = AtomicU64::new(0);

    let normalized: Vec<NormalizedEmailRecord> = pool.install(|| {
        records
            .par_iter()
            .map(|record| {
                let normalized = panic::catch_unwind(AssertUnwindSafe(|| normalize_record(record)))
                    .unwrap_or_else(|payload| {
                        let reason = panic_message(payload.as_ref());
                        warn!(file = %record.file, reason = %reason, "Normalizer panicked");
                        NormalizedEmailRecord {
                            file: record.file.clone(),
                            error: Some(format!("normalizer panicked: {reason}")),
                            ..NormalizedEmailRecord::default()
                        }
                    });
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(report) = progress {
                    report(finished, total);
                }
                normalized
            })
            .collect()
    });

    info!(records = normalized.len(), "Normalized stage complete");
    Ok(normalized)
}

/// Run both stages and write every configured snapshot.
///
/// The raw corpus is written before normalization starts, so it survives a
/// later failure.
pub fn run(config: &PipelineConfig, progress: Option<StageProgress<'_>>) -> Result<RunOutput> {
    let report = |stage: Stage, done: u64, total: u64| {
        if let Some(progress) = progress {
            progress(stage, done, total);
        }
    };

    let ingested = ingest(
        config,
        Some(&|done, total| report(Stage::Parse, done, total)),
    )?;
    corpus::write_corpus(&ingested.records, &config.raw_output, config.pretty)?;

    let normalized = normalize_all(
        &ingested.records,
        config.workers,
        Some(&|done, total| report(Stage::Normalize, done, total)),
    )?;
    write_normalized(&normalized, config)?;

    let summary = RunSummary::from_normalized(&normalized).with_bytes_read(ingested.bytes_read);
    Ok(RunOutput {
        raw: ingested.records,
        normalized,
        summary,
    })
}

/// Write the normalized corpus, plus the CSV export when configured.
pub fn write_normalized(records: &[NormalizedEmailRecord], config: &PipelineConfig) -> Result<()> {
    corpus::write_corpus(records, &config.normalized_output, config.pretty)?;
    if let Some(ref csv_path) = config.csv_output {
        csv::export_csv(records, csv_path).map_err(|e| IngestError::corpus(csv_path, e))?;
        info!(path = %csv_path.display(), "Wrote CSV export");
    }
    Ok(())
}

fn worker_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("spamsift-worker-{i}"))
        .build()
        .map_err(|e| IngestError::WorkerPool(e.to_string()))
}

/// Identifier of `path` relative to `root`, with `/` separators.
fn file_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
