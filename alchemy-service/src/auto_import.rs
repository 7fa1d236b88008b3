//! Inbox directory importer.
//!
//! Recursively polls a configured directory for supported files and submits
//! each one to the job queue. Once a job finishes, its result is written to
//! the output directory as `<relative path>.json` and the source file is
//! deleted. Failed sources are moved to a `failed/` subdirectory, keeping
//! their relative path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ImportConfig;
use crate::error::{ProcessingError, QueueError, ServiceError, ServiceResult};
use crate::ingestion::hash::sha256_file;
use crate::jobs::{Job, JobId, JobQueue, JobStatus, TaskKind};
use crate::schemas::ParseResponse;
use crate::service::file_job;

/// Directory to skip when scanning (case-insensitive)
const FAILED_DIRECTORY: &str = "failed";

/// Content hashes remembered for duplicate detection
const IMPORTED_HASH_LIMIT: usize = 10_000;

/// A submitted file waiting for its job to finish.
struct InFlight {
    id: JobId,
    hash: String,
}

/// Hashes of recent successful imports; the oldest are forgotten first.
struct ImportedHashes {
    order: VecDeque<String>,
    members: HashSet<String>,
    limit: usize,
}

impl ImportedHashes {
    fn new(limit: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            limit: limit.max(1),
        }
    }

    fn contains(&self, hash: &str) -> bool {
        self.members.contains(hash)
    }

    fn insert(&mut self, hash: String) {
        if !self.members.insert(hash.clone()) {
            return;
        }
        self.order.push_back(hash);
        while self.order.len() > self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }
}

/// Polls an inbox directory and feeds its files to a job queue.
pub struct AutoImporter {
    queue: Arc<JobQueue>,
    inbox: PathBuf,
    output_dir: PathBuf,
    poll_interval: Duration,
    in_flight: HashMap<PathBuf, InFlight>,
    imported: ImportedHashes,
}

impl AutoImporter {
    /// Build an importer, or `None` when no inbox directory is configured.
    pub fn from_config(queue: Arc<JobQueue>, config: &ImportConfig) -> Option<Self> {
        let inbox = config.dir.clone()?;
        let output_dir = config.output_dir()?;
        Some(Self {
            queue,
            inbox,
            output_dir,
            poll_interval: config.poll_interval(),
            in_flight: HashMap::new(),
            imported: ImportedHashes::new(IMPORTED_HASH_LIMIT),
        })
    }

    /// Run the import loop on a background task until cancelled or the queue closes.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        info!(path = %self.inbox.display(), output = %self.output_dir.display(), "Auto-import started");

        if let Err(e) = self.prepare_directories() {
            error!(error = %e, "Failed to create auto-import directories, importer stopping");
            return;
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => match self.tick() {
                    Ok(0) => {}
                    Ok(submitted) => debug!(submitted, "Auto-import submitted files"),
                    Err(ServiceError::Queue(QueueError::Closed)) => {
                        info!("Job queue closed, auto-import stopping");
                        break;
                    }
                    Err(e) => error!(error = %e, "Auto-import scan error"),
                },
            }
        }

        // Jobs drained by a stopping queue still get their results written.
        self.collect_finished();
        if !self.in_flight.is_empty() {
            info!(
                unfinished = self.in_flight.len(),
                "Auto-import stopped with unfinished files; they will be resubmitted"
            );
        }
    }

    fn prepare_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.inbox.join(FAILED_DIRECTORY))?;
        std::fs::create_dir_all(&self.output_dir)
    }

    /// Handle finished jobs, then submit new files. Returns how many were submitted.
    pub fn tick(&mut self) -> ServiceResult<usize> {
        self.collect_finished();
        self.submit_new_files()
    }

    fn collect_finished(&mut self) {
        let finished: Vec<(PathBuf, Option<Job>)> = self
            .in_flight
            .iter()
            .filter_map(|(path, entry)| match self.queue.get_job(entry.id) {
                Some(job) if job.is_terminal() => Some((path.clone(), Some(job))),
                Some(_) => None,
                None => Some((path.clone(), None)),
            })
            .collect();

        for (path, job) in finished {
            let Some(entry) = self.in_flight.remove(&path) else {
                continue;
            };
            let display_path = self.display_path(&path);

            // Dropping it from `in_flight` resubmits the file on the next scan.
            let Some(job) = job else {
                warn!(file = %display_path, job_id = %entry.id, "Auto-import job evicted before collection");
                continue;
            };

            match (job.status(), job.result()) {
                (JobStatus::Done, Some(response)) => match self.write_result(&path, response) {
                    Ok(dest) => {
                        info!(file = %display_path, output = %dest.display(), "Auto-import processed file");
                        self.imported.insert(entry.hash);
                        remove_source(&path, &display_path);
                        cleanup_empty_dirs(path.parent(), &self.inbox);
                    }
                    Err(e) => {
                        error!(file = %display_path, error = %e, "Failed to write auto-import result");
                        move_to_failed(&path, &self.inbox);
                        cleanup_empty_dirs(path.parent(), &self.inbox);
                    }
                },
                _ => {
                    error!(
                        file = %display_path,
                        error = job.error().unwrap_or("unknown error"),
                        "Auto-import failed"
                    );
                    move_to_failed(&path, &self.inbox);
                    cleanup_empty_dirs(path.parent(), &self.inbox);
                }
            }
        }
    }

    fn submit_new_files(&mut self) -> ServiceResult<usize> {
        let mut files = Vec::new();
        collect_files_recursive(&self.inbox, &self.inbox, &self.output_dir, &mut files)
            .map_err(ProcessingError::Io)?;
        files.sort();

        let mut submitted = 0;
        for path in files {
            if self.in_flight.contains_key(&path) {
                continue;
            }
            let display_path = self.display_path(&path);

            let hash = match sha256_file(&path) {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(file = %display_path, error = %e, "Failed to hash file, skipping");
                    continue;
                }
            };
            if self.imported.contains(&hash) {
                info!(file = %display_path, hash = %hash, "Skipped duplicate file (deleted)");
                remove_source(&path, &display_path);
                cleanup_empty_dirs(path.parent(), &self.inbox);
                continue;
            }
            if self.in_flight.values().any(|entry| entry.hash == hash) {
                debug!(file = %display_path, "Same content already in flight, waiting");
                continue;
            }

            let content = std::fs::read(&path).map_err(ProcessingError::Io)?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("unknown");
            let Some(job) = file_job(filename, Bytes::from(content)) else {
                continue;
            };

            match self.queue.enqueue(job) {
                Ok(id) => {
                    debug!(file = %display_path, job_id = %id, "Auto-import submitted file");
                    self.in_flight.insert(path, InFlight { id, hash });
                    submitted += 1;
                }
                Err(QueueError::Full { capacity }) => {
                    debug!(capacity, "Job queue full, retrying next scan");
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(submitted)
    }

    fn write_result(&self, path: &Path, response: &ParseResponse) -> ServiceResult<PathBuf> {
        let relative = path.strip_prefix(&self.inbox).unwrap_or(path);
        let mut name = OsString::from(relative.as_os_str());
        name.push(".json");
        let dest = self.output_dir.join(name);

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(ProcessingError::Io)?;
        }
        let json = serde_json::to_vec_pretty(response).map_err(ServiceError::Serialization)?;
        std::fs::write(&dest, json).map_err(ProcessingError::Io)?;
        Ok(dest)
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.inbox)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Recursively collect supported files, skipping `failed/` at the root and the output directory.
fn collect_files_recursive(
    dir: &Path,
    base_dir: &Path,
    output_dir: &Path,
    files: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)?.filter_map(|e| e.ok()) {
        let path = entry.path();

        if path.is_dir() {
            if path == output_dir {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && path.parent() == Some(base_dir)
                && name.eq_ignore_ascii_case(FAILED_DIRECTORY)
            {
                continue;
            }
            collect_files_recursive(&path, base_dir, output_dir, files)?;
        } else if path.is_file() && is_supported_format(&path) {
            files.push(path);
        }
    }

    Ok(())
}

fn is_supported_format(path: &Path) -> bool {
    TaskKind::for_path(path).is_some()
}

fn remove_source(path: &Path, display_path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(file = %display_path, error = %e, "Failed to delete imported file");
    }
}

/// Move a file to the failed/ directory, preserving its relative path structure.
fn move_to_failed(file_path: &Path, base_dir: &Path) {
    let relative = file_path.strip_prefix(base_dir).unwrap_or(file_path);
    let dest = base_dir.join(FAILED_DIRECTORY).join(relative);

    if let Some(parent) = dest.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(dest = %parent.display(), error = %e, "Failed to create directory in failed/");
        return;
    }

    if let Err(e) = std::fs::rename(file_path, &dest) {
        warn!(
            file = %file_path.display(),
            error = %e,
            "Rename into failed/ failed, copying instead"
        );
        if let Err(copy_err) = std::fs::copy(file_path, &dest) {
            warn!(file = %file_path.display(), error = %copy_err, "Copy into failed/ failed, leaving in place");
            return;
        }
        if let Err(del_err) = std::fs::remove_file(file_path) {
            warn!(file = %file_path.display(), error = %del_err, "Failed to delete original after copy");
        }
    }
}

/// Remove empty directories up to (but not including) the base directory.
fn cleanup_empty_dirs(start: Option<&Path>, base_dir: &Path) {
    let Some(mut dir) = start else { return };

    while dir != base_dir && dir.starts_with(base_dir) {
        if dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.eq_ignore_ascii_case(FAILED_DIRECTORY))
        {
            break;
        }
        if std::fs::remove_dir(dir).is_err() {
            break;
        }
        debug!(dir = %dir.display(), "Removed empty directory");

        dir = match dir.parent() {
            Some(p) => p,
            None => break,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::jobs::QueueOptions;
    use crate::service::AlchemyContext;
    use tempfile::TempDir;

    fn import_config(inbox: &TempDir) -> ImportConfig {
        ImportConfig {
            dir: Some(inbox.path().to_path_buf()),
            ..ImportConfig::default()
        }
    }

    fn write(inbox: &TempDir, relative: &str, content: &str) {
        let path = inbox.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn wait_until_idle(queue: &JobQueue) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let summary = queue.summary();
                if summary.pending == 0 && summary.running == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    fn document_queue(options: QueueOptions) -> Arc<JobQueue> {
        let mut settings = Settings::default();
        settings.features.load_web = false;
        let context = AlchemyContext::new(settings).unwrap();
        Arc::new(JobQueue::new(context.dispatcher(), options))
    }

    #[test]
    fn test_is_supported_format() {
        assert!(is_supported_format(Path::new("test.md")));
        assert!(is_supported_format(Path::new("test.PDF")));
        assert!(is_supported_format(Path::new("scan.png")));
        assert!(is_supported_format(Path::new("talk.mp3")));

        assert!(!is_supported_format(Path::new("archive.zip")));
        assert!(!is_supported_format(Path::new("test")));
    }

    #[test]
    fn test_disabled_without_inbox() {
        let queue = document_queue(QueueOptions::default());
        assert!(AutoImporter::from_config(queue, &ImportConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_import_writes_results_and_cleans_inbox() {
        let inbox = TempDir::new().unwrap();
        write(&inbox, "dup.txt", "same words");
        write(&inbox, "notes.md", "# Notes\n\nSome text.");
        write(&inbox, "sub/readme.txt", "same words");
        write(&inbox, "broken.pdf", "%PDF-1.7");
        write(&inbox, "ignored.zip", "PK");

        let queue = document_queue(QueueOptions::default());
        queue.start(2).unwrap();
        let mut importer = AutoImporter::from_config(Arc::clone(&queue), &import_config(&inbox)).unwrap();
        importer.prepare_directories().unwrap();

        // readme.txt matches dup.txt, which is still in flight
        assert_eq!(importer.tick().unwrap(), 3);
        wait_until_idle(&queue).await;
        assert_eq!(importer.tick().unwrap(), 0);

        let processed = inbox.path().join("processed");
        let notes: ParseResponse =
            serde_json::from_slice(&std::fs::read(processed.join("notes.md.json")).unwrap()).unwrap();
        assert_eq!(notes.source, "notes.md");
        assert!(processed.join("dup.txt.json").exists());
        assert!(!processed.join("sub/readme.txt.json").exists());

        assert!(!inbox.path().join("notes.md").exists());
        assert!(!inbox.path().join("dup.txt").exists());
        assert!(!inbox.path().join("sub").exists());
        assert!(inbox.path().join("failed/broken.pdf").exists());
        assert!(inbox.path().join("ignored.zip").exists());

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_full_queue_retries_next_scan() {
        let inbox = TempDir::new().unwrap();
        write(&inbox, "a.txt", "first");
        write(&inbox, "b.txt", "second");

        let queue = document_queue(QueueOptions {
            capacity: Some(1),
            ..QueueOptions::default()
        });
        let mut importer = AutoImporter::from_config(Arc::clone(&queue), &import_config(&inbox)).unwrap();

        assert_eq!(importer.tick().unwrap(), 1);
        assert_eq!(queue.queue_size(), 1);

        queue.start(1).unwrap();
        wait_until_idle(&queue).await;
        assert_eq!(importer.tick().unwrap(), 1);
        wait_until_idle(&queue).await;
        importer.tick().unwrap();

        assert!(inbox.path().join("processed/a.txt.json").exists());
        assert!(inbox.path().join("processed/b.txt.json").exists());
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_unwritable_result_moves_source_to_failed() {
        let inbox = TempDir::new().unwrap();
        write(&inbox, "a.txt", "content");
        write(&inbox, "blocked", "not a directory");

        let queue = document_queue(QueueOptions::default());
        queue.start(1).unwrap();
        let config = ImportConfig {
            output_dir: Some(inbox.path().join("blocked")),
            ..import_config(&inbox)
        };
        let mut importer = AutoImporter::from_config(Arc::clone(&queue), &config).unwrap();

        assert_eq!(importer.tick().unwrap(), 1);
        wait_until_idle(&queue).await;
        assert_eq!(importer.tick().unwrap(), 0);
        assert_eq!(importer.tick().unwrap(), 0);

        assert!(inbox.path().join("failed/a.txt").exists());
        assert!(!inbox.path().join("a.txt").exists());
        assert_eq!(queue.summary().total, 1);
        queue.stop().await;
    }

    #[test]
    fn test_imported_hashes_forget_oldest() {
        let mut hashes = ImportedHashes::new(2);
        hashes.insert("a".to_string());
        hashes.insert("b".to_string());
        hashes.insert("a".to_string());
        hashes.insert("c".to_string());

        assert!(!hashes.contains("a"));
        assert!(hashes.contains("b"));
        assert!(hashes.contains("c"));
        assert_eq!(hashes.order.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_queue_stops_importer() {
        let inbox = TempDir::new().unwrap();
        write(&inbox, "a.txt", "late");

        let queue = document_queue(QueueOptions::default());
        queue.stop().await;

        let importer = AutoImporter::from_config(Arc::clone(&queue), &import_config(&inbox)).unwrap();
        let handle = importer.spawn(CancellationToken::new());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(inbox.path().join("a.txt").exists());
    }
}
