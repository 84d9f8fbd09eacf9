//! Health checks over the corpus and the store's persisted state.
//!
//! The doctor never mutates anything and never takes the lock. It reports
//! problems in two buckets: errors, which would break or poison a rebuild,
//! and warnings, which are worth a look but not fatal.

use std::collections::{BTreeMap, BTreeSet};

use mneme_core::StoreSettings;

use crate::cache::BuildCache;
use crate::corpus;
use crate::errors::StoreResult;
use crate::lock::StoreLock;
use crate::models::MemoryKind;
use crate::paths;
use crate::registry::VersionRegistry;
use crate::snapshots::SnapshotStore;

#[derive(Debug, Clone, Default)]
pub struct CorpusDocStats {
    pub files: usize,
    pub records: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DoctorReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub corpus_stats: BTreeMap<MemoryKind, CorpusDocStats>,
}

impl DoctorReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

pub async fn run_doctor(settings: &StoreSettings) -> StoreResult<DoctorReport> {
    let mut report = DoctorReport::default();

    for kind in MemoryKind::all() {
        check_corpus(settings, kind, &mut report).await?;
    }
    check_quality_floors(&mut report);
    check_state(settings, &mut report).await?;

    Ok(report)
}

async fn check_corpus(
    settings: &StoreSettings,
    kind: MemoryKind,
    report: &mut DoctorReport,
) -> StoreResult<()> {
    let root = paths::corpus_dir(settings, kind)?;
    let mut stats = CorpusDocStats::default();

    if !root.is_dir() {
        report
            .warnings
            .push(format!("{kind}: corpus directory missing: {}", root.display()));
        report.corpus_stats.insert(kind, stats);
        return Ok(());
    }

    let scanned = corpus::scan_corpus(kind, &root).await?;
    stats.files = scanned.len();

    for path in scanned.keys() {
        let content = match tokio::fs::read_to_string(root.join(path)).await {
            Ok(content) => content,
            Err(err) => {
                report.errors.push(format!("{kind}/{path}: unreadable: {err}"));
                continue;
            }
        };

        if kind.is_structured() {
            check_structured_file(kind, path, &content, &mut stats, report);
        } else {
            stats.records += 1;
            let trimmed = content.trim();
            if trimmed.is_empty() {
                report.warnings.push(format!("{kind}/{path}: empty document"));
            } else if trimmed.len() < 50 {
                report
                    .warnings
                    .push(format!("{kind}/{path}: very short ({} chars)", trimmed.len()));
            }
        }
    }

    report.corpus_stats.insert(kind, stats);
    Ok(())
}

fn check_structured_file(
    kind: MemoryKind,
    path: &str,
    content: &str,
    stats: &mut CorpusDocStats,
    report: &mut DoctorReport,
) {
    match kind {
        MemoryKind::Example => match corpus::parse_example_file(content) {
            Ok(records) => {
                stats.records += records.len();
                for (i, record) in records.iter().enumerate() {
                    if record.prompt.trim().is_empty() {
                        report
                            .warnings
                            .push(format!("{kind}/{path}[{i}]: empty prompt"));
                    }
                    if record.response.trim().is_empty() {
                        report
                            .warnings
                            .push(format!("{kind}/{path}[{i}]: empty response"));
                    }
                }
            }
            Err(err) => report.errors.push(format!("{kind}/{path}: {err}")),
        },
        MemoryKind::Rule => match corpus::parse_rule_file(content) {
            Ok(records) => {
                stats.records += records.len();
                for (i, record) in records.iter().enumerate() {
                    if record.name.trim().is_empty() {
                        report.warnings.push(format!("{kind}/{path}[{i}]: unnamed rule"));
                    }
                    if record.body.trim().is_empty() {
                        report
                            .warnings
                            .push(format!("{kind}/{path}[{i}]: empty rule body"));
                    }
                }
            }
            Err(err) => report.errors.push(format!("{kind}/{path}: {err}")),
        },
        MemoryKind::Factual => {}
    }
}

/// Floors below which the indexed corpus is too thin to be useful.
fn check_quality_floors(report: &mut DoctorReport) {
    let files = |kind: MemoryKind| {
        report
            .corpus_stats
            .get(&kind)
            .map(|s| s.files)
            .unwrap_or(0)
    };
    let records = |kind: MemoryKind| {
        report
            .corpus_stats
            .get(&kind)
            .map(|s| s.records)
            .unwrap_or(0)
    };

    let factual = files(MemoryKind::Factual);
    let examples = records(MemoryKind::Example);
    let rules = records(MemoryKind::Rule);

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if factual == 0 {
        errors.push("no factual documents found".to_string());
    } else if factual < 3 {
        warnings.push(format!("only {factual} factual documents"));
    }

    if examples == 0 {
        errors.push("no example records found".to_string());
    } else if examples < 10 {
        warnings.push(format!("only {examples} example records"));
    }

    if rules == 0 {
        warnings.push("no rule records found".to_string());
    }

    report.errors.extend(errors);
    report.warnings.extend(warnings);
}

async fn check_state(settings: &StoreSettings, report: &mut DoctorReport) -> StoreResult<()> {
    let cache_path = paths::cache_path(settings)?;
    if let Err(err) = BuildCache::load(&cache_path).await {
        report.errors.push(format!("build cache: {err}"));
    }

    let registry_path = paths::registry_path(settings)?;
    let snapshots = SnapshotStore::new(paths::snapshots_root(settings)?);

    match VersionRegistry::load(&registry_path).await {
        Err(err) => report.errors.push(format!("version registry: {err}")),
        Ok(registry) => {
            let mut referenced = BTreeSet::new();
            for entry in registry.entries() {
                if let Some(dir) = &entry.snapshot_dir {
                    referenced.insert(dir.clone());
                    if !snapshots.exists(&entry.id) {
                        report
                            .errors
                            .push(format!("snapshot missing for version {}", entry.id));
                    }
                }
            }
            if !registry.is_empty() && registry.active().is_none() {
                report.errors.push("no version is marked active".to_string());
            }

            for dir in snapshots.list_dirs().await? {
                if !referenced.contains(&dir) {
                    report
                        .warnings
                        .push(format!("orphan snapshot directory: {dir}"));
                }
            }
        }
    }

    let lock_path = paths::lock_path(settings)?;
    if StoreLock::is_held(&lock_path) {
        report
            .warnings
            .push("another process currently holds the store lock".to_string());
    }

    Ok(())
}
