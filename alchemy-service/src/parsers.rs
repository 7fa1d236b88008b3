//! Built-in capability implementations.
//!
//! - `document` - markdown, plain text and HTML files
//! - `web` - HTTP pages with same-host link following

mod document;
mod web;

pub use document::TextDocumentParser;
pub use web::HttpWebParser;
