//! Command implementations for the `docqa` binary.
//!
//! Each `run_*` function loads what it needs from the [`Config`], performs
//! one operation, and prints a human-readable summary to stdout. Failures
//! are returned as `anyhow` errors so `main` can report them and exit
//! non-zero.

use anyhow::{bail, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::history::ConversationLog;
use crate::ingest::{IngestReport, IngestionService};
use crate::ollama::check_backend;
use crate::pipeline::{PipelineState, RagPipeline};
use crate::system;

/// Create storage directories and the empty index.
pub async fn run_init(config: &Config) -> Result<()> {
    let pipeline = RagPipeline::open(config).await?;
    let info = pipeline.collection_info().await?;
    println!("Initialized {}.", config.app.name);
    println!("  Documents:  {}", config.storage.data_path.display());
    if let Some(path) = &info.path {
        println!("  Index:      {}", path.display());
    }
    println!("  History:    {}", config.storage.history_file_path().display());
    Ok(())
}

/// Copy files into managed storage and index whatever is not indexed yet.
pub async fn run_ingest(config: &Config, paths: &[PathBuf], no_index: bool) -> Result<()> {
    let service = IngestionService::new(&config.storage.data_path, &config.app)?;
    let report = service.validate_and_ingest(paths)?;
    index_report(config, &report, no_index).await
}

/// Ingest every supported file found under a directory.
pub async fn run_ingest_dir(config: &Config, dir: &Path, no_index: bool) -> Result<()> {
    let service = IngestionService::new(&config.storage.data_path, &config.app)?;
    let report = service.ingest_from_directory(dir)?;
    index_report(config, &report, no_index).await
}

/// Index every managed file that has no chunks in the index yet.
pub async fn run_index(config: &Config) -> Result<()> {
    let service = IngestionService::new(&config.storage.data_path, &config.app)?;
    let managed: Vec<PathBuf> = service
        .list_managed_files()
        .into_iter()
        .map(|doc| doc.path)
        .collect();

    let pipeline = RagPipeline::open(config).await?;
    let pending = pipeline.unindexed(&managed).await?;
    if pending.is_empty() {
        println!("Index is up to date ({} documents).", managed.len());
        return Ok(());
    }
    index_paths(&pipeline, &pending).await
}

/// Duplicates resolve to files copied earlier, which may never have been
/// indexed (`--no-index`, or a failed indexing step), so every admitted
/// path is checked against the index.
async fn index_report(config: &Config, report: &IngestReport, no_index: bool) -> Result<()> {
    print_ingest_report(report);

    let admitted = report.admitted_paths();
    if admitted.is_empty() || no_index {
        return Ok(());
    }

    let pipeline = RagPipeline::open(config).await?;
    let pending = pipeline.unindexed(&admitted).await?;
    if pending.is_empty() {
        println!("All admitted documents are already indexed.");
        return Ok(());
    }
    index_paths(&pipeline, &pending).await
}

async fn index_paths(pipeline: &RagPipeline, paths: &[PathBuf]) -> Result<()> {
    let added = pipeline.add_documents(paths).await?;
    println!(
        "Indexed {} documents into {} chunks.",
        added.document_count, added.chunk_count
    );
    for path in &added.skipped {
        println!("  skipped (unreadable): {}", path.display());
    }
    Ok(())
}

fn print_ingest_report(report: &IngestReport) {
    println!("{}", report.message);
    println!("  Total size: {:.2} MB", report.total_size_mb());
    for file in &report.admitted {
        let note = match file.admission {
            crate::ingest::Admission::Copied => "copied",
            crate::ingest::Admission::Duplicate => "duplicate of",
        };
        println!(
            "  {:<12} {} -> {}",
            note,
            file.source.display(),
            file.managed_path.display()
        );
    }
    for rejected in report.rejected().iter().chain(&report.copy_failures) {
        println!("  rejected     {}: {}", rejected.name, rejected.reason);
    }
}

/// Answer a question and record the exchange.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("Question is empty.");
    }

    let pipeline = RagPipeline::open(config).await?;
    let answer = if config.performance.streaming {
        let mut stdout = std::io::stdout();
        let answer = pipeline
            .query_streaming(question, &mut |token: &str| {
                let _ = write!(stdout, "{}", token);
                let _ = stdout.flush();
            })
            .await?;
        println!();
        answer
    } else {
        let answer = pipeline.query(question).await?;
        println!("{}", answer.answer);
        answer
    };

    if config.ui.show_sources && !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            let label = if config.ui.show_citations {
                format!("[{}] ", source.index + 1)
            } else {
                String::new()
            };
            let page = source
                .metadata
                .page
                .map(|p| format!("page {}, ", p))
                .unwrap_or_default();
            println!(
                "  {}{} ({}chunk {}, score {:.3})",
                label, source.metadata.filename, page, source.metadata.chunk_index, source.score
            );
            println!("      {}", source.content.replace('\n', " "));
        }
    }

    let log = ConversationLog::new(config.storage.history_file_path());
    log.append(question, &answer.answer, &answer.sources)?;
    Ok(())
}

/// List managed files, newest first.
pub fn run_files(config: &Config) -> Result<()> {
    let service = IngestionService::new(&config.storage.data_path, &config.app)?;
    let files = service.list_managed_files();
    if files.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<40} {:>6} {:>10}   MODIFIED", "NAME", "TYPE", "SIZE");
    for doc in &files {
        println!(
            "{:<40} {:>6} {:>10}   {}",
            doc.name,
            doc.extension,
            format_bytes(doc.size_bytes),
            format_ts_relative(doc.modified.timestamp())
        );
    }
    Ok(())
}

pub fn run_remove(config: &Config, path: &Path) -> Result<()> {
    let service = IngestionService::new(&config.storage.data_path, &config.app)?;
    if !service.remove_file(path) {
        bail!("Not removed: {} is not a file in managed storage", path.display());
    }
    println!("Removed {}.", path.display());
    Ok(())
}

/// Clear the selected stores; with no selection, clear all three.
pub async fn run_clear(config: &Config, files: bool, index: bool, history: bool) -> Result<()> {
    let all = !(files || index || history);

    if all || files {
        let service = IngestionService::new(&config.storage.data_path, &config.app)?;
        service.clear_all()?;
        println!("Cleared managed documents.");
    }
    if all || index {
        let pipeline = RagPipeline::open(config).await?;
        pipeline.clear_index().await?;
        println!("Cleared vector index.");
    }
    if all || history {
        ConversationLog::new(config.storage.history_file_path()).clear()?;
        println!("Cleared conversation history.");
    }
    Ok(())
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let service = IngestionService::new(&config.storage.data_path, &config.app)?;
    let stats = service.stats();
    let pipeline = RagPipeline::open(config).await?;
    let info = pipeline.collection_info().await?;

    println!("{} Stats", config.app.name);
    println!("================================");
    println!();
    println!("  Data path:   {}", stats.data_path.display());
    println!("  Files:       {} / {}", stats.total_files, stats.max_files);
    println!(
        "  Size:        {:.2} MB (upload limit {} MB)",
        stats.total_size_mb, stats.max_size_mb
    );
    for (ext, count) in &stats.type_breakdown {
        println!("    {:<8} {}", ext, count);
    }
    println!();
    println!("  Collection:  {}", info.collection_name);
    println!("  Chunks:      {}", info.document_count);
    if let Some(path) = &info.path {
        println!("  Index:       {}", path.display());
    }
    println!("  Retrieval:   {}", pipeline.search_mode().label());
    println!();
    Ok(())
}

pub fn run_history(config: &Config, limit: Option<usize>) -> Result<()> {
    let log = ConversationLog::new(config.storage.history_file_path());
    let history = log.read();
    if history.is_empty() {
        println!("No conversation history.");
        return Ok(());
    }

    let limit = limit.unwrap_or(config.ui.max_chat_history_display);
    let start = history.len().saturating_sub(limit);
    for exchange in &history[start..] {
        println!(
            "[{}] Q: {}",
            format_ts_relative(exchange.timestamp.timestamp()),
            exchange.question
        );
        println!("    A: {}", exchange.answer);
        if !exchange.sources.is_empty() {
            let names: Vec<&str> = exchange
                .sources
                .iter()
                .map(|s| s.metadata.filename.as_str())
                .collect();
            println!("    Sources: {}", names.join(", "));
        }
        println!();
    }
    println!("Showing {} of {} exchanges.", history.len() - start, history.len());
    Ok(())
}

pub fn run_history_clear(config: &Config) -> Result<()> {
    ConversationLog::new(config.storage.history_file_path()).clear()?;
    println!("Conversation history cleared.");
    Ok(())
}

/// Report model server health, pipeline state, and host load.
pub async fn run_status(config: &Config) -> Result<()> {
    let status = check_backend(&config.models).await;

    println!("{:<16} {}", "BACKEND", status.base_url);
    if status.reachable {
        println!("{:<16} {}", "REACHABLE", "yes");
        println!("{:<16} {}", "INSTALLED", status.installed.join(", "));
    } else {
        println!("{:<16} no ({})", "REACHABLE", status.error.as_deref().unwrap_or("unknown error"));
    }
    if !status.missing.is_empty() {
        println!("{:<16} {}", "MISSING", status.missing.join(", "));
    }

    let pipeline = RagPipeline::open(config).await?;
    let state = match pipeline.state().await? {
        PipelineState::Ready => "ready (no documents)",
        PipelineState::ReadyWithDocuments => "ready",
    };
    println!("{:<16} {}", "PIPELINE", state);

    let host = system::sample().await;
    println!(
        "{:<16} {:.1} / {:.1} GB ({:.1}%), {:.1} GB available",
        "MEMORY", host.memory_used_gb, host.memory_total_gb, host.memory_percent, host.available_memory_gb
    );
    println!("{:<16} {:.1}%", "CPU", host.cpu_percent);
    println!("{:<16} {}", "HEALTHY", status.is_healthy());
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
