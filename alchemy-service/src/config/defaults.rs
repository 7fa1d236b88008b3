//! Default value functions for configuration sections.

use super::schemas::{ChunkingConfig, CrawlerConfig, FeaturesConfig, ImportConfig, QueueConfig};
use crate::schemas::OutputFormat;

// ==================== Section Defaults ====================

pub(crate) fn default_queue() -> QueueConfig {
    QueueConfig {
        max_workers: default_max_workers(),
        capacity: None,
        retention_secs: default_retention_secs(),
        cleanup_interval_secs: default_cleanup_interval_secs(),
    }
}

pub(crate) fn default_chunking() -> ChunkingConfig {
    ChunkingConfig {
        chunk_size: default_chunk_size(),
        chunk_overlap: default_chunk_overlap(),
        semantic_chunking: true,
        default_output_format: OutputFormat::Markdown,
    }
}

pub(crate) fn default_features() -> FeaturesConfig {
    FeaturesConfig {
        load_documents: true,
        load_web: true,
    }
}

pub(crate) fn default_crawler() -> CrawlerConfig {
    CrawlerConfig {
        timeout_secs: default_crawler_timeout_secs(),
        user_agent: default_user_agent(),
        max_links_per_page: default_max_links_per_page(),
    }
}

pub(crate) fn default_import() -> ImportConfig {
    ImportConfig {
        dir: None,
        output_dir: None,
        poll_interval_secs: default_poll_interval_secs(),
    }
}

// ==================== Field Defaults ====================

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_max_workers() -> usize {
    2
}

pub(crate) fn default_retention_secs() -> u64 {
    3600
}

pub(crate) fn default_cleanup_interval_secs() -> u64 {
    60
}

pub(crate) fn default_chunk_size() -> usize {
    512
}

pub(crate) fn default_chunk_overlap() -> usize {
    64
}

pub(crate) fn default_crawler_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; AlchemyBot/2.0)".to_string()
}

pub(crate) fn default_max_links_per_page() -> usize {
    5
}

pub(crate) fn default_poll_interval_secs() -> u64 {
    10
}
