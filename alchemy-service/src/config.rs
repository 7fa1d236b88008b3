//! Service settings.
//!
//! Settings are read once at startup (file, then `ALCHEMY__*` environment
//! variables) and shared read-only afterwards.

mod defaults;
mod loader;
mod schemas;

use serde::{Deserialize, Serialize};

pub use loader::load_settings;
pub use schemas::{ChunkingConfig, CrawlerConfig, FeaturesConfig, ImportConfig, QueueConfig};

use crate::error::{ServiceError, ServiceResult};

/// All service settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub import: ImportConfig,
}

impl Settings {
    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> ServiceResult<()> {
        let invalid = |message: String| Err(ServiceError::Config { message });

        if self.queue.max_workers == 0 {
            return invalid("queue.max_workers must be at least 1".to_string());
        }
        if self.queue.capacity == Some(0) {
            return invalid("queue.capacity must be at least 1 when set".to_string());
        }
        if self.chunking.chunk_size == 0 {
            return invalid("chunking.chunk_size must be at least 1".to_string());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if self.crawler.timeout_secs == 0 {
            return invalid("crawler.timeout_secs must be at least 1".to_string());
        }

        Ok(())
    }
}
