//! Structured output shared by every capability.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Modality a result was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Document,
    Image,
    Audio,
    Video,
    Web,
}

/// Requested output shape for document parsing
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Chunks,
}

/// Image analysis tasks accepted by image capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImageTask {
    Ocr,
    Caption,
    DetailedCaption,
    ObjectDetection,
    TableExtraction,
    Qa,
}

/// One chunk of a document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub index: usize,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub tokens: usize,
}

/// A table extracted from a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub markdown: String,
}

/// An image or figure referenced by a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

/// Unified structured output for all parsed content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResponse {
    /// Filename or URL
    pub source: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default)]
    pub chunks: Vec<DocumentChunk>,
    #[serde(default)]
    pub tables: Vec<TableData>,
    #[serde(default)]
    pub images: Vec<ImageData>,
    /// Page count, sizes, status codes and similar facts
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Full structured output when JSON output was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl ParseResponse {
    pub fn new(source: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            source: source.into(),
            content_type,
            markdown: None,
            chunks: Vec::new(),
            tables: Vec::new(),
            images: Vec::new(),
            metadata: BTreeMap::new(),
            raw: None,
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_response_serialization_skips_empty_options() {
        let response = ParseResponse::new("a.md", ContentType::Document).with_metadata("num_tables", 0);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["source"], "a.md");
        assert_eq!(json["content_type"], "document");
        assert_eq!(json["metadata"]["num_tables"], 0);
        assert!(json.get("markdown").is_none());
        assert!(json.get("raw").is_none());
    }

    #[test]
    fn test_enum_names() {
        assert_eq!(OutputFormat::from_str("chunks").unwrap(), OutputFormat::Chunks);
        assert_eq!(ImageTask::from_str("detailed_caption").unwrap(), ImageTask::DetailedCaption);
        assert!(ImageTask::from_str("dance").is_err());
        assert_eq!(ContentType::Web.to_string(), "web");
    }
}
