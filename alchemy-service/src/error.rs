use thiserror::Error;

use crate::jobs::{JobId, JobStatus, PayloadError, TaskKind};

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Job queue error")]
    Queue(#[from] QueueError),

    #[error("Document processing failed")]
    Processing(#[from] ProcessingError),

    #[error("Serialization failed")]
    Serialization(#[source] serde_json::Error),
}

/// Job queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job queue is closed")]
    Closed,

    #[error("Job queue is full ({capacity} pending jobs)")]
    Full { capacity: usize },

    #[error("Job {id} is already registered")]
    DuplicateJob { id: JobId },

    #[error("Job {id} is {status}; only pending jobs can be submitted")]
    NotPending { id: JobId, status: JobStatus },

    #[error("Job {id} failed: {message}")]
    JobFailed { id: JobId, message: String },

    #[error("Job {id} was evicted before it was collected")]
    Evicted { id: JobId },
}

/// Job lifecycle errors
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Routing errors raised before or around a capability invocation
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown task: {task}")]
    UnknownTask { task: String },

    #[error("Invalid payload for {task}")]
    Payload {
        task: TaskKind,
        #[source]
        source: PayloadError,
    },

    #[error("No capability loaded for {task}. {hint}")]
    CapabilityUnavailable { task: TaskKind, hint: &'static str },

    #[error("Capability panicked while running {task}: {message}")]
    Panicked { task: TaskKind, message: String },

    #[error(transparent)]
    Capability(#[from] ProcessingError),
}

/// Document processing errors raised by capabilities
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: String },

    #[error("{filename} is not valid UTF-8")]
    InvalidEncoding {
        filename: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),

    #[error("Fetching {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("Invalid HTTP header: {name}")]
    InvalidHeader { name: String },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and all of its sources as a single line.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_includes_sources() {
        let error = DispatchError::Payload {
            task: TaskKind::ParseDocument,
            source: PayloadError::Missing {
                key: "filename".to_string(),
            },
        };
        assert_eq!(
            format_error_chain(&error),
            "Invalid payload for parse_document: missing required key 'filename'"
        );
    }

    #[test]
    fn test_transparent_capability_error() {
        let error = DispatchError::from(ProcessingError::UnsupportedFormat {
            format: "pdf".to_string(),
        });
        assert_eq!(format_error_chain(&error), "Unsupported file format: pdf");
    }

    #[test]
    fn test_service_error_wraps_queue_error() {
        let error = ServiceError::from(QueueError::Full { capacity: 3 });
        assert_eq!(
            format_error_chain(&error),
            "Job queue error: Job queue is full (3 pending jobs)"
        );
    }
}
