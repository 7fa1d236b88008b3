//! Typed requests built from job payloads.

use std::collections::BTreeMap;
use std::str::FromStr;

use bytes::Bytes;

use crate::jobs::{Payload, PayloadError, TaskKind};
use crate::schemas::{ImageTask, OutputFormat};

/// Deepest crawl a web request may ask for
pub const MAX_CRAWL_DEPTH: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRequest {
    pub content: Bytes,
    pub filename: String,
    /// MIME type hint supplied by the caller
    pub content_type: Option<String>,
    pub extract_tables: bool,
    pub extract_images: bool,
    /// `None` falls back to the configured default
    pub output_format: Option<OutputFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub content: Bytes,
    pub filename: String,
    pub task: ImageTask,
    /// Question for `qa`, or extra guidance for other tasks
    pub prompt: Option<String>,
}

/// Audio and video share one request shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRequest {
    pub content: Bytes,
    pub filename: String,
    pub language: Option<String>,
    pub diarize: bool,
    /// Video only
    pub extract_frames: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebRequest {
    pub url: String,
    pub max_depth: u32,
    pub css_selector: Option<String>,
    pub extraction_schema: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
}

#[cfg(test)]
impl WebRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_depth: 1,
            css_selector: None,
            extraction_schema: None,
            headers: BTreeMap::new(),
        }
    }
}

/// A validated request for one task kind
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRequest {
    Document(DocumentRequest),
    Image(ImageRequest),
    Audio(MediaRequest),
    Video(MediaRequest),
    Web(WebRequest),
}

impl TaskRequest {
    /// Check required keys, then pull typed fields out of the payload.
    pub fn from_payload(kind: TaskKind, payload: &Payload) -> Result<Self, PayloadError> {
        if let Some(key) = kind
            .required_keys()
            .iter()
            .find(|key| !payload.contains(key))
        {
            return Err(PayloadError::Missing {
                key: key.to_string(),
            });
        }

        let request = match kind {
            TaskKind::ParseDocument => TaskRequest::Document(DocumentRequest {
                content: payload.bytes("content")?,
                filename: payload.string("filename")?,
                content_type: payload.opt_string("content_type")?,
                extract_tables: payload.bool_or("extract_tables", true)?,
                extract_images: payload.bool_or("extract_images", true)?,
                output_format: parse_opt(payload, "output_format")?,
            }),
            TaskKind::ParseImage => TaskRequest::Image(ImageRequest {
                content: payload.bytes("content")?,
                filename: payload.string("filename")?,
                task: parse_opt(payload, "task")?.ok_or_else(|| PayloadError::Missing {
                    key: "task".to_string(),
                })?,
                prompt: payload.opt_string("prompt")?,
            }),
            TaskKind::ParseAudio => TaskRequest::Audio(media_request(payload, false)?),
            TaskKind::ParseVideo => TaskRequest::Video(media_request(payload, true)?),
            TaskKind::ParseWeb => TaskRequest::Web(WebRequest {
                url: payload.string("url")?,
                max_depth: crawl_depth(payload)?,
                css_selector: payload.opt_string("css_selector")?,
                extraction_schema: payload.opt_json("extraction_schema")?,
                headers: payload.string_map("headers")?,
            }),
        };

        Ok(request)
    }
}

fn media_request(payload: &Payload, video: bool) -> Result<MediaRequest, PayloadError> {
    Ok(MediaRequest {
        content: payload.bytes("content")?,
        filename: payload.string("filename")?,
        language: payload.opt_string("language")?,
        diarize: payload.bool_or("diarize", false)?,
        extract_frames: video && payload.bool_or("extract_frames", false)?,
    })
}

fn crawl_depth(payload: &Payload) -> Result<u32, PayloadError> {
    let depth = payload.int_or("max_depth", 1)?;
    match u32::try_from(depth) {
        Ok(depth @ 1..=MAX_CRAWL_DEPTH) => Ok(depth),
        _ => Err(PayloadError::InvalidValue {
            key: "max_depth".to_string(),
            reason: format!("{depth} is outside 1..={MAX_CRAWL_DEPTH}"),
        }),
    }
}

/// Parse an optional string field into a strum enum.
fn parse_opt<T: FromStr>(payload: &Payload, key: &str) -> Result<Option<T>, PayloadError> {
    payload
        .opt_string(key)?
        .map(|value| {
            T::from_str(&value).map_err(|_| PayloadError::InvalidValue {
                key: key.to_string(),
                reason: format!("unrecognised value '{value}'"),
            })
        })
        .transpose()
}
