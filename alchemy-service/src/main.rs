use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod auto_import;
mod config;
mod dispatch;
mod error;
mod ingestion;
mod jobs;
mod parsers;
mod schemas;
mod service;

use crate::auto_import::AutoImporter;
use crate::error::format_error_chain;
use crate::jobs::Job;
use crate::service::{AlchemyContext, file_job, run_batch, url_job};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    init_logging();

    info!("Starting Alchemy service v{}", env!("CARGO_PKG_VERSION"));

    let settings = config::load_settings()?;
    let context = AlchemyContext::new(settings)?;

    let inputs: Vec<String> = std::env::args().skip(1).collect();
    if inputs.is_empty() {
        run_daemon(&context).await?;
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(run_once(&context, &inputs).await)
    }
}

/// Process every input and print each result as JSON, in input order.
///
/// A single input runs inline; several are spread over the worker pool.
async fn run_once(context: &AlchemyContext, inputs: &[String]) -> ExitCode {
    let queue = context.job_queue();
    let mut failures = 0;

    let mut jobs = Vec::with_capacity(inputs.len());
    let mut job_inputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        match job_for_input(input).await {
            Ok(job) => {
                jobs.push(job);
                job_inputs.push(input);
            }
            Err(message) => {
                error!(input = %input, error = %message, "Cannot build job");
                failures += 1;
            }
        }
    }

    let outcomes = match jobs.len() {
        0 => Vec::new(),
        1 => {
            let mut jobs = jobs;
            match jobs.pop() {
                Some(job) => vec![queue.run_sync(job).await],
                None => Vec::new(),
            }
        }
        count => {
            let workers = context.settings.queue.max_workers.min(count);
            if let Err(e) = queue.start(workers) {
                error!(error = %e, "Failed to start workers");
                return ExitCode::FAILURE;
            }
            let outcomes = run_batch(&queue, jobs).await;
            queue.stop().await;
            outcomes
        }
    };

    for (input, outcome) in job_inputs.into_iter().zip(outcomes) {
        match outcome {
            Ok(response) => match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    error!(input = %input, error = %e, "Failed to serialize result");
                    failures += 1;
                }
            },
            Err(e) => {
                error!(input = %input, error = %format_error_chain(&e), "Processing failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        warn!(failures, total = inputs.len(), "Some inputs failed");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Existing paths become file jobs; anything else is crawled as a URL.
async fn job_for_input(input: &str) -> Result<Job, String> {
    let path = Path::new(input);
    if !path.is_file() {
        return Ok(url_job(input));
    }

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(input);
    let content = tokio::fs::read(path)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    file_job(filename, Bytes::from(content))
        .ok_or_else(|| format!("Unsupported file format: {filename}"))
}

/// Run workers and the inbox importer until Ctrl-C.
async fn run_daemon(context: &AlchemyContext) -> Result<(), Box<dyn std::error::Error>> {
    let queue = Arc::new(context.job_queue());
    queue.start(context.settings.queue.max_workers)?;

    let cancel = CancellationToken::new();
    let importer = AutoImporter::from_config(Arc::clone(&queue), &context.settings.import)
        .map(|importer| importer.spawn(cancel.clone()));
    if importer.is_none() {
        info!("Auto-import disabled (no import.dir configured)");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    queue.stop().await;
    cancel.cancel();
    if let Some(handle) = importer
        && let Err(e) = handle.await
    {
        error!(error = %e, "Auto-import task ended abnormally");
    }

    let health = context.health(&queue);
    info!(
        status = health.status,
        models_loaded = ?health.models_loaded,
        queue_size = health.queue_size,
        total = health.jobs.total,
        done = health.jobs.done,
        failed = health.jobs.failed,
        "Alchemy service stopped"
    );
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("alchemy_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
