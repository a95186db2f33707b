use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use genqueue_core::{GenerationRequest, JobStatus, SourceImage, WorkspaceView};
use genqueue_engine::{
    export_artifacts, restore_store, save_workspace, HttpOperationClient, Orchestrator,
};
use genqueue_logging::{gq_info, gq_warn};

use crate::args::CliArgs;
use crate::config::AppConfig;

const STATUS_EVERY: Duration = Duration::from_secs(5);

/// Restores the workspace, queues the requested work, runs until idle (or
/// Ctrl-C) and saves the workspace again.
pub async fn run(args: CliArgs, config: AppConfig) -> anyhow::Result<()> {
    let workspace = args
        .workspace
        .clone()
        .unwrap_or_else(|| config.workspace.clone());

    let (store, report) = restore_store(&config.state_dir, &workspace)
        .with_context(|| format!("failed to restore workspace {workspace}"))?;
    gq_info!(
        "workspace {} restored: {} job(s), {} still queued, {} interrupted",
        workspace,
        store.len(),
        report.requeued,
        report.marked_stale
    );
    if report.marked_stale > 0 {
        println!(
            "{} job(s) were interrupted by the last shutdown and are marked FAILED",
            report.marked_stale
        );
    }
    if report.invalid > 0 {
        println!(
            "{} job(s) had an invalid request in the snapshot and are marked FAILED",
            report.invalid
        );
    }

    if config.orchestrator.api_key.is_none() {
        gq_warn!("no API key configured; every job will fail");
        eprintln!("warning: no API key (set GENQUEUE_API_KEY or api_key in the config file)");
    }
    let api_key = config.orchestrator.api_key.clone().unwrap_or_default();
    let client = HttpOperationClient::new(config.http.clone(), api_key)
        .context("failed to build HTTP client")?;
    let orchestrator = Orchestrator::start(store, Arc::new(client), config.orchestrator.clone());

    if args.retry_failed {
        let retried = orchestrator.retry_failed();
        println!("re-queued {} failed job(s)", retried.len());
    }

    let source_image = args
        .image
        .as_deref()
        .map(load_source_image)
        .transpose()?;
    for prompt in &args.prompts {
        let mut request = GenerationRequest::new(prompt.clone()).with_outputs(args.outputs);
        request.model = args.model;
        request.aspect_ratio = args.aspect;
        request.resolution = args.resolution;
        request.source_image = source_image.clone();
        let id = orchestrator
            .enqueue(request)
            .with_context(|| format!("cannot queue {prompt:?}"))?;
        println!("queued {id}: {prompt}");
    }

    drive_until_idle(&orchestrator).await;

    let jobs = orchestrator.jobs();
    save_workspace(&config.state_dir, &workspace, &jobs)
        .with_context(|| format!("failed to save workspace {workspace}"))?;

    if args.export {
        let summary = export_artifacts(&jobs, &config.export_dir)?;
        println!(
            "exported {} file(s) to {} ({} without bytes, {} failed)",
            summary.written.len(),
            config.export_dir.display(),
            summary.skipped,
            summary.failed
        );
    }

    print_summary(&orchestrator.view());
    orchestrator.shutdown();
    Ok(())
}

async fn drive_until_idle(orchestrator: &Orchestrator) {
    let idle = orchestrator.wait_idle();
    tokio::pin!(idle);
    let mut ticker = tokio::time::interval(STATUS_EVERY);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut idle => break,
            _ = ticker.tick() => print_progress(&orchestrator.view()),
            _ = tokio::signal::ctrl_c() => {
                gq_warn!("interrupted; saving workspace with jobs in flight");
                orchestrator.shutdown();
                break;
            }
        }
    }
}

fn load_source_image(path: &Path) -> anyhow::Result<SourceImage> {
    let mime_type = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => bail!("unsupported image type: {}", path.display()),
    };
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(SourceImage {
        mime_type: mime_type.to_string(),
        data,
    })
}

fn print_progress(view: &WorkspaceView) {
    for row in view
        .jobs
        .iter()
        .filter(|row| row.status == JobStatus::Generating)
    {
        println!("  {} {}", row.id.short(), row.progress_message);
    }
    println!(
        "  {} queued, {} generating, {} completed, {} failed",
        view.queued, view.generating, view.completed, view.failed
    );
}

fn print_summary(view: &WorkspaceView) {
    println!("workspace {}", view.workspace);
    for row in &view.jobs {
        let detail = match (&row.error, row.status) {
            (Some(error), _) => error.clone(),
            (None, JobStatus::Completed) => format!("{} output(s)", row.artifacts),
            (None, _) => row.progress_message.clone(),
        };
        println!(
            "  {:<10} {}  {:<40}  {}",
            row.status.label(),
            row.id.short(),
            truncate(&row.prompt, 40),
            detail
        );
    }
    println!(
        "{} queued, {} generating, {} completed, {} failed",
        view.queued, view.generating, view.completed, view.failed
    );
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
