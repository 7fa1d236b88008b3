//! Routing of jobs to processing capabilities.
//!
//! - `requests` - typed requests built and validated from job payloads
//! - `capabilities` - async capability traits and the loaded set

mod capabilities;
mod requests;

use std::panic::AssertUnwindSafe;
use std::str::FromStr;

use futures::FutureExt;
use tracing::debug;

pub use capabilities::{
    CapabilitySet, DocumentCapability, ImageCapability, MediaCapability, WebCapability,
};
pub use requests::{DocumentRequest, TaskRequest, WebRequest};

use crate::error::DispatchError;
use crate::jobs::{Payload, TaskKind};
use crate::schemas::ParseResponse;

/// Maps a task name and payload to one capability call.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    capabilities: CapabilitySet,
}

impl Dispatcher {
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Validate the job and invoke the matching capability.
    ///
    /// A panic inside the capability is reported as an error rather than
    /// unwinding into the caller.
    pub async fn dispatch(
        &self,
        task: &str,
        payload: &Payload,
    ) -> Result<ParseResponse, DispatchError> {
        let kind = TaskKind::from_str(task).map_err(|_| DispatchError::UnknownTask {
            task: task.to_string(),
        })?;
        let request = TaskRequest::from_payload(kind, payload)
            .map_err(|source| DispatchError::Payload { task: kind, source })?;

        debug!(task = %kind, "Dispatching job");

        AssertUnwindSafe(self.invoke(request))
            .catch_unwind()
            .await
            .map_err(|panic| DispatchError::Panicked {
                task: kind,
                message: panic_message(panic.as_ref()),
            })?
    }

    async fn invoke(&self, request: TaskRequest) -> Result<ParseResponse, DispatchError> {
        let caps = &self.capabilities;
        let response = match request {
            TaskRequest::Document(request) => caps.document()?.parse_document(request).await?,
            TaskRequest::Image(request) => caps.image()?.parse_image(request).await?,
            TaskRequest::Audio(request) => {
                caps.media(TaskKind::ParseAudio)?
                    .parse_audio(request)
                    .await?
            }
            TaskRequest::Video(request) => {
                caps.media(TaskKind::ParseVideo)?
                    .parse_video(request)
                    .await?
            }
            TaskRequest::Web(request) => caps.web()?.parse_web(request).await?,
        };
        Ok(response)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
