//! Service context: settings plus the capabilities built from them.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::config::Settings;
use crate::dispatch::{CapabilitySet, Dispatcher};
use crate::error::{QueueError, ServiceResult};
use crate::jobs::{Job, JobId, JobQueue, JobSummary, Payload, QueueOptions, TaskKind};
use crate::parsers::{HttpWebParser, TextDocumentParser};
use crate::schemas::{ImageTask, ParseResponse};

/// Everything built once at startup and shared by reference afterwards.
pub struct AlchemyContext {
    pub settings: Arc<Settings>,
    dispatcher: Arc<Dispatcher>,
}

impl AlchemyContext {
    /// Build the context, loading the built-in capabilities enabled in `settings`.
    pub fn new(settings: Settings) -> ServiceResult<Self> {
        let mut capabilities = CapabilitySet::new();

        if settings.features.load_documents {
            capabilities =
                capabilities.with_document(Arc::new(TextDocumentParser::new(&settings.chunking)));
        }
        if settings.features.load_web {
            let parser = HttpWebParser::new(&settings.crawler, &settings.chunking)?;
            capabilities = capabilities.with_web(Arc::new(parser));
        }

        info!(capabilities = ?capabilities.loaded(), "Capabilities loaded");
        Ok(Self::with_capabilities(settings, capabilities))
    }

    /// Build the context around an externally assembled capability set.
    pub fn with_capabilities(settings: Settings, capabilities: CapabilitySet) -> Self {
        Self {
            settings: Arc::new(settings),
            dispatcher: Arc::new(Dispatcher::new(capabilities)),
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// A new, not yet started, job queue using the configured options.
    pub fn job_queue(&self) -> JobQueue {
        JobQueue::new(self.dispatcher(), QueueOptions::from(&self.settings.queue))
    }

    pub fn health(&self, queue: &JobQueue) -> HealthReport {
        HealthReport {
            status: "ok",
            models_loaded: self.dispatcher.capabilities().loaded(),
            queue_size: queue.queue_size(),
            workers: queue.worker_count(),
            jobs: queue.summary(),
        }
    }
}

/// Service health snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub models_loaded: Vec<&'static str>,
    pub queue_size: usize,
    pub workers: usize,
    pub jobs: JobSummary,
}

/// Build the job for a file, inferring the task from its extension.
///
/// Images default to a detailed caption.
pub fn file_job(filename: &str, content: Bytes) -> Option<Job> {
    let kind = TaskKind::for_path(Path::new(filename))?;
    let mut payload = Payload::new()
        .with("content", content)
        .with("filename", filename);
    if kind == TaskKind::ParseImage {
        payload.insert("task", ImageTask::DetailedCaption.to_string());
    }
    Some(Job::for_task(kind, payload))
}

pub fn url_job(url: &str) -> Job {
    Job::for_task(TaskKind::ParseWeb, Payload::new().with("url", url))
}

/// Run jobs through a started queue's workers, returning outcomes in submission order.
///
/// When the queue is full, submission waits for the oldest outstanding job
/// before retrying.
pub async fn run_batch(
    queue: &JobQueue,
    jobs: Vec<Job>,
) -> Vec<Result<ParseResponse, QueueError>> {
    let mut submissions: Vec<Result<JobId, QueueError>> = Vec::with_capacity(jobs.len());
    let mut oldest = 0;

    for job in jobs {
        let submission = loop {
            match queue.enqueue(job.clone()) {
                Err(QueueError::Full { .. }) if oldest < submissions.len() => {
                    if let Ok(id) = &submissions[oldest] {
                        queue.wait_for(*id).await;
                    }
                    oldest += 1;
                }
                other => break other,
            }
        };
        submissions.push(submission);
    }

    let mut outcomes = Vec::with_capacity(submissions.len());
    for submission in submissions {
        let outcome = match submission {
            Ok(id) => collect(queue, id).await,
            Err(e) => Err(e),
        };
        outcomes.push(outcome);
    }
    outcomes
}

async fn collect(queue: &JobQueue, id: JobId) -> Result<ParseResponse, QueueError> {
    let job = queue.wait_for(id).await.ok_or(QueueError::Evicted { id })?;
    match job.result() {
        Some(response) => Ok(response.clone()),
        None => Err(QueueError::JobFailed {
            id,
            message: job.error().unwrap_or("unknown error").to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;

    #[test]
    fn test_feature_flags_select_capabilities() {
        let context = AlchemyContext::new(Settings::default()).unwrap();
        assert_eq!(
            context.dispatcher().capabilities().loaded(),
            vec!["text-documents", "http-web"]
        );

        let mut settings = Settings::default();
        settings.features.load_web = false;
        let context = AlchemyContext::new(settings).unwrap();
        assert_eq!(context.dispatcher().capabilities().loaded(), vec!["text-documents"]);
    }

    #[test]
    fn test_file_job_infers_task() {
        let job = file_job("notes.md", Bytes::from_static(b"# Notes")).unwrap();
        assert_eq!(job.task, "parse_document");
        assert_eq!(job.payload.string("filename").unwrap(), "notes.md");

        let job = file_job("scan.png", Bytes::from_static(b"\x89PNG")).unwrap();
        assert_eq!(job.task, "parse_image");
        assert_eq!(job.payload.string("task").unwrap(), "detailed_caption");

        assert!(file_job("archive.zip", Bytes::new()).is_none());
    }

    #[tokio::test]
    async fn test_batch_runs_through_workers_in_order() {
        let mut settings = Settings::default();
        settings.features.load_web = false;
        settings.queue.capacity = Some(1);
        let context = AlchemyContext::new(settings).unwrap();
        let queue = context.job_queue();
        queue.start(2).unwrap();

        let jobs = vec![
            file_job("a.txt", Bytes::from_static(b"alpha")).unwrap(),
            file_job("b.md", Bytes::from_static(b"# Beta")).unwrap(),
            file_job("c.pdf", Bytes::from_static(b"%PDF")).unwrap(),
            file_job("d.txt", Bytes::from_static(b"delta")).unwrap(),
        ];
        let outcomes = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_batch(&queue, jobs),
        )
        .await
        .unwrap();

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[0].as_ref().unwrap().source, "a.txt");
        assert_eq!(outcomes[1].as_ref().unwrap().source, "b.md");
        assert!(matches!(
            &outcomes[2],
            Err(QueueError::JobFailed { message, .. }) if message.contains("Unsupported file format")
        ));
        assert_eq!(outcomes[3].as_ref().unwrap().source, "d.txt");
        assert_eq!(queue.summary().total, 4);

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_health_reports_queue_state() {
        let context = AlchemyContext::new(Settings::default()).unwrap();
        let queue = context.job_queue();

        let job = file_job("a.txt", Bytes::from_static(b"hello")).unwrap();
        let response = queue.run_sync(job).await.unwrap();
        assert_eq!(response.chunks.len(), 1);

        let image = file_job("b.png", Bytes::from_static(b"\x89PNG")).unwrap();
        let id = image.id;
        assert!(queue.run_sync(image).await.is_err());
        assert_eq!(queue.get_job(id).unwrap().status(), JobStatus::Failed);

        let health = context.health(&queue);
        assert_eq!(health.status, "ok");
        assert_eq!(health.queue_size, 0);
        assert_eq!(health.workers, 0);
        assert_eq!(health.jobs.done, 1);
        assert_eq!(health.jobs.failed, 1);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["models_loaded"][0], "text-documents");
    }
}
