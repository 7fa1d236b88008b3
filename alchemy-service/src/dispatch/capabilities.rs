//! Capability traits implemented by content processors.

use std::sync::Arc;

use async_trait::async_trait;

use super::requests::{DocumentRequest, ImageRequest, MediaRequest, WebRequest};
use crate::error::{DispatchError, ProcessingError};
use crate::jobs::TaskKind;
use crate::schemas::ParseResponse;

#[async_trait]
pub trait DocumentCapability: Send + Sync {
    fn name(&self) -> &'static str;

    async fn parse_document(
        &self,
        request: DocumentRequest,
    ) -> Result<ParseResponse, ProcessingError>;
}

#[async_trait]
pub trait ImageCapability: Send + Sync {
    fn name(&self) -> &'static str;

    async fn parse_image(&self, request: ImageRequest) -> Result<ParseResponse, ProcessingError>;
}

/// Transcription backend for audio and video.
#[async_trait]
pub trait MediaCapability: Send + Sync {
    fn name(&self) -> &'static str;

    async fn parse_audio(&self, request: MediaRequest) -> Result<ParseResponse, ProcessingError>;

    async fn parse_video(&self, request: MediaRequest) -> Result<ParseResponse, ProcessingError>;
}

#[async_trait]
pub trait WebCapability: Send + Sync {
    fn name(&self) -> &'static str;

    async fn parse_web(&self, request: WebRequest) -> Result<ParseResponse, ProcessingError>;
}

/// The processors available to the dispatcher. Any slot may be empty.
///
/// The service binary only fills the document and web slots; jobs for the
/// other slots fail with `CapabilityUnavailable`.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    document: Option<Arc<dyn DocumentCapability>>,
    image: Option<Arc<dyn ImageCapability>>,
    media: Option<Arc<dyn MediaCapability>>,
    web: Option<Arc<dyn WebCapability>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, capability: Arc<dyn DocumentCapability>) -> Self {
        self.document = Some(capability);
        self
    }

    #[cfg(test)]
    pub fn with_image(mut self, capability: Arc<dyn ImageCapability>) -> Self {
        self.image = Some(capability);
        self
    }

    #[cfg(test)]
    pub fn with_media(mut self, capability: Arc<dyn MediaCapability>) -> Self {
        self.media = Some(capability);
        self
    }

    pub fn with_web(mut self, capability: Arc<dyn WebCapability>) -> Self {
        self.web = Some(capability);
        self
    }

    pub fn document(&self) -> Result<&dyn DocumentCapability, DispatchError> {
        self.document
            .as_deref()
            .ok_or(DispatchError::CapabilityUnavailable {
                task: TaskKind::ParseDocument,
                hint: "Enable features.load_documents or register a document capability.",
            })
    }

    pub fn image(&self) -> Result<&dyn ImageCapability, DispatchError> {
        self.image
            .as_deref()
            .ok_or(DispatchError::CapabilityUnavailable {
                task: TaskKind::ParseImage,
                hint: "Register an image capability (OCR or vision model).",
            })
    }

    pub fn media(&self, task: TaskKind) -> Result<&dyn MediaCapability, DispatchError> {
        self.media
            .as_deref()
            .ok_or(DispatchError::CapabilityUnavailable {
                task,
                hint: "Register a media capability (speech-to-text backend).",
            })
    }

    pub fn web(&self) -> Result<&dyn WebCapability, DispatchError> {
        self.web.as_deref().ok_or(DispatchError::CapabilityUnavailable {
            task: TaskKind::ParseWeb,
            hint: "Enable features.load_web or register a web capability.",
        })
    }

    /// Names of the loaded capabilities, for health reporting.
    pub fn loaded(&self) -> Vec<&'static str> {
        [
            self.document.as_ref().map(|c| c.name()),
            self.image.as_ref().map(|c| c.name()),
            self.media.as_ref().map(|c| c.name()),
            self.web.as_ref().map(|c| c.name()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl std::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("loaded", &self.loaded())
            .finish()
    }
}
