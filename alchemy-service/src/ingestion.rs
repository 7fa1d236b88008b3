//! Text processing shared by the built-in capabilities.
//!
//! - `sections` - markdown heading segmentation
//! - `chunker` - the semantic chunker
//! - `html` - HTML tokenizing and markdown conversion
//! - `tables` - pipe table extraction
//! - `images` - image reference extraction
//! - `hash` - content fingerprints

pub mod chunker;
pub mod hash;
pub mod html;
pub mod images;
pub mod sections;
pub mod tables;

pub use chunker::{SemanticChunker, estimate_tokens};
