use std::io::{self, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use mneme_core::{EmbeddingSettings, Settings, StoreSettings};
use mneme_store::{
    CleanupReport, DoctorReport, MemoryKind, MnemeEngine, RebuildOptions, RebuildReport,
    StatusReport, StoreError, VersionDiff, VersionEntry, VersionId, run_doctor,
};

#[derive(Parser, Debug)]
#[command(name = "mneme", version, about = "Versioned incremental memory store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect corpus changes and reindex what changed
    Rebuild {
        /// Reindex every document, ignoring the build cache
        #[arg(long)]
        force: bool,

        /// Show pending changes without indexing or writing anything
        #[arg(long)]
        dry_run: bool,

        /// Record a version with snapshot after a clean rebuild
        #[arg(long)]
        create_version: bool,

        /// Description stored on the created version
        #[arg(long, requires = "create_version")]
        description: Option<String>,

        /// Restrict the run to one or more corpora (factual, example, rule)
        #[arg(long = "kind", value_name = "KIND")]
        kinds: Vec<MemoryKind>,
    },

    /// List every recorded version, oldest first
    Versions {
        /// Print the raw registry entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the active version
    Active,

    /// Restore a version's snapshot over the live index
    Rollback {
        /// Version to restore, e.g. v3_20260824_120000
        id: VersionId,

        /// Restore index and cache but leave the active pointer alone
        #[arg(long)]
        data_only: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Compare two versions by record counts and source digests
    Diff {
        from: VersionId,
        to: VersionId,

        /// Print the diff as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete old snapshots, keeping the most recent ones
    Cleanup {
        /// Snapshots to keep (defaults to keep_versions from the config)
        #[arg(long)]
        keep: Option<usize>,

        /// Report what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarize corpora, pending changes, versions and snapshots
    Status {
        /// Print the status report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check corpus quality and store state
    Doctor,

    /// Watch the corpus and rebuild on changes until interrupted
    Watch {
        /// Quiet window after the last filesystem event, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    mneme_core::load_dotenv();
    let cli = Cli::parse();

    if let Err(err) = run(cli.command).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    init_tracing(&settings.logging.level);
    info!(config = %Settings::config_path()?.display(), "settings loaded");

    let store = StoreSettings::from(&settings.store);
    let embedding = EmbeddingSettings::from(&settings.embedding);

    match command {
        Command::Rebuild {
            force,
            dry_run,
            create_version,
            description,
            kinds,
        } => {
            let engine = MnemeEngine::open(store, embedding).await?;
            let report = engine
                .rebuild(RebuildOptions {
                    kinds: if kinds.is_empty() { None } else { Some(kinds) },
                    force,
                    dry_run,
                    create_version,
                    description,
                })
                .await?;
            print_rebuild(&report);
            if report.has_failures() {
                std::process::exit(1);
            }
        }

        Command::Versions { json } => {
            let engine = MnemeEngine::open(store, embedding).await?;
            let versions = engine.list_versions().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else if versions.is_empty() {
                println!("no versions recorded");
            } else {
                for entry in &versions {
                    print_version_line(entry);
                }
            }
        }

        Command::Active => {
            let engine = MnemeEngine::open(store, embedding).await?;
            match engine.active_version().await {
                Ok(entry) => print_version_line(&entry),
                Err(StoreError::NotFound(_)) => println!("no active version"),
                Err(err) => return Err(err.into()),
            }
        }

        Command::Rollback { id, data_only, yes } => {
            if !yes && !confirm(&format!("Restore {id} over the live index? [y/N]: "))? {
                println!("Aborted.");
                return Ok(());
            }
            let engine = MnemeEngine::open(store, embedding).await?;
            let entry = engine.rollback(&id, data_only).await?;
            println!("✓ restored {} ({} records)", entry.id, entry.total_records());
            if data_only {
                println!("  active pointer left unchanged");
            }
        }

        Command::Diff { from, to, json } => {
            let engine = MnemeEngine::open(store, embedding).await?;
            let diff = engine.diff_versions(&from, &to).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                print_diff(&diff);
            }
        }

        Command::Cleanup { keep, dry_run } => {
            let keep = keep.unwrap_or(store.keep_versions);
            let engine = MnemeEngine::open(store, embedding).await?;
            let report = engine.cleanup(keep, dry_run).await?;
            print_cleanup(&report);
        }

        Command::Status { json } => {
            let engine = MnemeEngine::open(store, embedding).await?;
            let status = engine.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Command::Doctor => {
            let report = run_doctor(&store).await?;
            print_doctor(&report);
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }

        Command::Watch { debounce_ms } => {
            let debounce = Duration::from_millis(debounce_ms.unwrap_or(store.watch_debounce_ms));
            let engine = MnemeEngine::open(store, embedding).await?;
            println!(
                "watching for corpus changes ({} ms debounce, Ctrl-C to stop)",
                debounce.as_millis()
            );
            engine.watch(debounce).await?;
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let fallback = format!("mneme={default_level}");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(io::stderr)
        .init();
}

fn confirm(prompt: &str) -> Result<bool, Box<dyn std::error::Error>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn print_rebuild(report: &RebuildReport) {
    for (kind, corpus) in &report.corpora {
        let changes = &corpus.changes;
        if changes.is_empty() {
            println!("{kind}: up to date");
            continue;
        }
        println!(
            "{kind}: {} added, {} modified, {} deleted",
            changes.added.len(),
            changes.modified.len(),
            changes.deleted.len()
        );
        if report.dry_run {
            for path in &changes.added {
                println!("  + {path}");
            }
            for path in &changes.modified {
                println!("  ~ {path}");
            }
            for path in &changes.deleted {
                println!("  - {path}");
            }
        }
        for failure in &corpus.failures {
            println!("  ✗ {}: {}", failure.path, failure.reason);
        }
    }

    if report.dry_run {
        println!("\ndry run: nothing was indexed or written");
        return;
    }

    println!(
        "\n✓ indexed {}, removed {}, failed {} in {} ms",
        report.total_indexed(),
        report.total_removed(),
        report.total_failed(),
        report.duration_ms
    );
    if let Some(id) = &report.created_version {
        println!("✓ created version {id}");
    }
}

fn print_version_line(entry: &VersionEntry) {
    let marker = if entry.active { "*" } else { " " };
    let snapshot = if entry.snapshot_dir.is_some() {
        "snapshot"
    } else {
        "no snapshot"
    };
    let description = entry.description.as_deref().unwrap_or("");
    println!(
        "{marker} {}  {}  {:>6} records  {snapshot}  {description}",
        entry.id,
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.total_records()
    );
}

fn print_diff(diff: &VersionDiff) {
    println!("{} -> {}", diff.from, diff.to);
    for kind in MemoryKind::all() {
        let counts = &diff.record_counts[&kind];
        let source = if diff.source_changed[&kind] {
            "source changed"
        } else {
            "source unchanged"
        };
        println!(
            "  {kind}: {} -> {} records ({:+}), {source}",
            counts.before,
            counts.after,
            counts.delta()
        );
    }
}

fn print_cleanup(report: &CleanupReport) {
    if report.deleted.is_empty() {
        println!("nothing to delete");
        return;
    }
    let verb = if report.dry_run { "would delete" } else { "deleted" };
    for id in &report.deleted {
        println!("{verb} {id}");
    }
    let kept: Vec<String> = report.kept.iter().map(ToString::to_string).collect();
    println!("kept: {}", kept.join(", "));
    println!(
        "{} {}",
        if report.dry_run { "would reclaim" } else { "reclaimed" },
        human_bytes(report.reclaimed_bytes)
    );
}

fn print_status(status: &StatusReport) {
    match &status.active_version {
        Some(entry) => println!(
            "active version: {} ({} records)",
            entry.id,
            entry.total_records()
        ),
        None => println!("active version: none"),
    }
    println!(
        "versions: {}  snapshots: {} ({})",
        status.version_count,
        status.snapshot_count,
        human_bytes(status.snapshot_bytes)
    );

    for (kind, corpus) in &status.corpora {
        let records = corpus
            .records
            .map(|count| count.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "\n{kind}: {} on disk, {} cached, {records} records indexed",
            corpus.on_disk, corpus.cached
        );
        for path in &corpus.pending.added {
            println!("  + {path}");
        }
        for path in &corpus.pending.modified {
            println!("  ~ {path}");
        }
        for path in &corpus.pending.deleted {
            println!("  - {path}");
        }
    }
}

fn print_doctor(report: &DoctorReport) {
    for (kind, stats) in &report.corpus_stats {
        println!("{kind}: {} files, {} records", stats.files, stats.records);
    }
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    if report.is_healthy() {
        println!("\n✓ store is healthy");
    } else {
        println!("\nstore has problems that need attention");
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
