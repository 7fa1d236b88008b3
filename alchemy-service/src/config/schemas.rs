//! Configuration section definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schemas::OutputFormat;

/// Job queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Workers started in daemon mode
    #[serde(default = "super::defaults::default_max_workers")]
    pub max_workers: usize,

    /// Maximum jobs waiting for a worker; unset means unbounded
    #[serde(default)]
    pub capacity: Option<usize>,

    /// How long finished jobs stay pollable. 0 keeps them forever.
    #[serde(default = "super::defaults::default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "super::defaults::default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        super::defaults::default_queue()
    }
}

/// Chunking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in estimated tokens
    #[serde(default = "super::defaults::default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "super::defaults::default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Attach chunks to every document and web result
    #[serde(default = "super::defaults::default_true")]
    pub semantic_chunking: bool,

    #[serde(default)]
    pub default_output_format: OutputFormat,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        super::defaults::default_chunking()
    }
}

/// Which built-in capabilities to load at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "super::defaults::default_true")]
    pub load_documents: bool,

    #[serde(default = "super::defaults::default_true")]
    pub load_web: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        super::defaults::default_features()
    }
}

/// HTTP crawler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "super::defaults::default_crawler_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "super::defaults::default_user_agent")]
    pub user_agent: String,

    /// Same-host links followed per page when crawling deeper than one level
    #[serde(default = "super::defaults::default_max_links_per_page")]
    pub max_links_per_page: usize,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        super::defaults::default_crawler()
    }
}

/// Inbox directory polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Directory to watch. Import is disabled when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Where results are written; defaults to `<dir>/processed`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "super::defaults::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl ImportConfig {
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output_dir
            .clone()
            .or_else(|| self.dir.as_ref().map(|dir| dir.join("processed")))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        super::defaults::default_import()
    }
}
