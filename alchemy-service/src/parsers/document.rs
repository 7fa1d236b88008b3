//! Built-in parser for markdown, plain text and HTML documents.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::dispatch::{DocumentCapability, DocumentRequest};
use crate::error::ProcessingError;
use crate::ingestion::hash::sha256_hex;
use crate::ingestion::html::{extract_title, html_to_markdown};
use crate::ingestion::images::extract_image_refs;
use crate::ingestion::sections::split_by_headings;
use crate::ingestion::tables::extract_markdown_tables;
use crate::ingestion::{SemanticChunker, estimate_tokens};
use crate::schemas::{ContentType, ImageData, OutputFormat, ParseResponse};

/// Supported file extensions
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "text", "html", "htm"];

/// Parses UTF-8 text documents into markdown, tables, image references and chunks.
#[derive(Debug, Clone)]
pub struct TextDocumentParser {
    chunker: SemanticChunker,
    semantic_chunking: bool,
    default_output_format: OutputFormat,
}

impl TextDocumentParser {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunker: SemanticChunker::from(config),
            semantic_chunking: config.semantic_chunking,
            default_output_format: config.default_output_format,
        }
    }
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

fn is_html(extension: &str, content_type: Option<&str>) -> bool {
    matches!(extension, "html" | "htm") || content_type.is_some_and(|ct| ct.contains("html"))
}

#[async_trait]
impl DocumentCapability for TextDocumentParser {
    fn name(&self) -> &'static str {
        "text-documents"
    }

    async fn parse_document(
        &self,
        request: DocumentRequest,
    ) -> Result<ParseResponse, ProcessingError> {
        let extension = extension(&request.filename);
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ProcessingError::UnsupportedFormat {
                format: if extension.is_empty() {
                    request.filename.clone()
                } else {
                    format!(".{extension}")
                },
            });
        }

        let text = String::from_utf8(request.content.to_vec()).map_err(|source| {
            ProcessingError::InvalidEncoding {
                filename: request.filename.clone(),
                source,
            }
        })?;

        let html = is_html(&extension, request.content_type.as_deref());
        let title = if html { extract_title(&text) } else { None };
        let markdown = if html {
            html_to_markdown(&text)
        } else {
            text.replace("\r\n", "\n")
        };

        let output_format = request.output_format.unwrap_or(self.default_output_format);
        let sections = split_by_headings(&markdown);

        let mut response = ParseResponse::new(&request.filename, ContentType::Document);
        if request.extract_tables {
            response.tables = extract_markdown_tables(&markdown);
        }
        if request.extract_images {
            let refs = extract_image_refs(&markdown);
            response.images = refs
                .iter()
                .enumerate()
                .map(|(index, image)| ImageData {
                    index,
                    caption: (!image.alt.is_empty()).then(|| image.alt.clone()),
                    page: None,
                    base64: None,
                })
                .collect();
            if !refs.is_empty() {
                let sources: Vec<&str> = refs.iter().map(|image| image.src.as_str()).collect();
                response = response.with_metadata("image_sources", json!(sources));
            }
        }
        if self.semantic_chunking || output_format == OutputFormat::Chunks {
            response.chunks = self.chunker.chunk(&markdown);
        }
        if output_format == OutputFormat::Json {
            let outline: Vec<_> = sections
                .iter()
                .map(|section| {
                    json!({
                        "heading": section.heading,
                        "tokens": estimate_tokens(section.body),
                    })
                })
                .collect();
            response.raw = Some(json!({ "sections": outline }));
        }

        debug!(
            filename = %request.filename,
            sections = sections.len(),
            chunks = response.chunks.len(),
            "Parsed text document"
        );

        let num_tables = response.tables.len();
        let num_sections = sections.len();
        let mut response = response
            .with_metadata("filename", request.filename.as_str())
            .with_metadata("format", extension)
            .with_metadata("size_bytes", request.content.len())
            .with_metadata("sha256", sha256_hex(&request.content))
            .with_metadata("num_tables", num_tables)
            .with_metadata("num_sections", num_sections);
        if let Some(title) = title {
            response = response.with_metadata("title", title);
        }
        response.markdown = Some(markdown);

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn parser() -> TextDocumentParser {
        TextDocumentParser::new(&ChunkingConfig::default())
    }

    fn request(content: &'static str, filename: &str) -> DocumentRequest {
        DocumentRequest {
            content: Bytes::from_static(content.as_bytes()),
            filename: filename.to_string(),
            content_type: None,
            extract_tables: true,
            extract_images: true,
            output_format: None,
        }
    }

    const NOTES: &str = "# Inventory\n\nStock levels.\n\n| Item | Qty |\n| --- | --- |\n| Bolt | 40 |\n\n## Photos\n\n![Shelf](shelf.jpg)\n";

    #[tokio::test]
    async fn test_markdown_document() {
        let response = parser().parse_document(request(NOTES, "notes.md")).await.unwrap();

        assert_eq!(response.source, "notes.md");
        assert_eq!(response.content_type, ContentType::Document);
        assert_eq!(response.markdown.as_deref(), Some(NOTES));
        assert_eq!(response.tables.len(), 1);
        assert_eq!(response.tables[0].rows, vec![vec!["Bolt", "40"]]);
        assert_eq!(response.images.len(), 1);
        assert_eq!(response.images[0].caption.as_deref(), Some("Shelf"));
        assert_eq!(response.metadata["num_tables"], 1);
        assert_eq!(response.metadata["num_sections"], 2);
        assert_eq!(response.metadata["size_bytes"], NOTES.len());
        assert_eq!(response.metadata["sha256"], sha256_hex(NOTES.as_bytes()));
        assert_eq!(response.metadata["image_sources"], json!(["shelf.jpg"]));

        let sections: Vec<_> = response
            .chunks
            .iter()
            .map(|chunk| chunk.section.as_deref())
            .collect();
        assert_eq!(sections, vec![Some("Inventory"), Some("Photos")]);
        assert!(response.raw.is_none());
    }

    #[tokio::test]
    async fn test_extraction_flags_disable_tables_and_images() {
        let mut request = request(NOTES, "notes.md");
        request.extract_tables = false;
        request.extract_images = false;

        let response = parser().parse_document(request).await.unwrap();
        assert!(response.tables.is_empty());
        assert!(response.images.is_empty());
        assert_eq!(response.metadata["num_tables"], 0);
    }

    #[tokio::test]
    async fn test_html_document_is_converted() {
        let html = "<html><head><title>Guide</title></head><body><h1>Setup</h1><p>Install it.</p></body></html>";
        let response = parser().parse_document(request(html, "guide.HTML")).await.unwrap();

        assert_eq!(response.markdown.as_deref(), Some("# Setup\n\nInstall it."));
        assert_eq!(response.metadata["title"], "Guide");
        assert_eq!(response.chunks[0].section.as_deref(), Some("Setup"));
    }

    #[tokio::test]
    async fn test_chunks_only_when_enabled_or_requested() {
        let config = ChunkingConfig {
            semantic_chunking: false,
            ..ChunkingConfig::default()
        };
        let parser = TextDocumentParser::new(&config);

        let response = parser.parse_document(request("plain text", "a.txt")).await.unwrap();
        assert!(response.chunks.is_empty());

        let mut chunked = request("plain text", "a.txt");
        chunked.output_format = Some(OutputFormat::Chunks);
        let response = parser.parse_document(chunked).await.unwrap();
        assert_eq!(response.chunks.len(), 1);
        assert_eq!(response.chunks[0].text, "plain text");
    }

    #[tokio::test]
    async fn test_json_output_has_section_outline() {
        let mut request = request(NOTES, "notes.md");
        request.output_format = Some(OutputFormat::Json);

        let response = parser().parse_document(request).await.unwrap();
        let raw = response.raw.unwrap();
        assert_eq!(raw["sections"][0]["heading"], "Inventory");
        assert_eq!(raw["sections"][1]["heading"], "Photos");
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let error = parser()
            .parse_document(request("%PDF-1.7", "report.pdf"))
            .await
            .unwrap_err();
        assert_eq!(error.to_string(), "Unsupported file format: .pdf");
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let request = DocumentRequest {
            content: Bytes::from_static(&[0xff, 0xfe, 0x00]),
            ..request("", "broken.txt")
        };
        let error = parser().parse_document(request).await.unwrap_err();
        assert!(matches!(error, ProcessingError::InvalidEncoding { .. }));
    }
}
