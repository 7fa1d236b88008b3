//! Task kinds understood by the dispatcher.
//!
//! Task names are derived from enum variants via strum, so the string a
//! caller submits and the variant the dispatcher matches on cannot drift.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "pptx", "ppt", "html", "htm", "xlsx", "md", "markdown", "txt", "text",
];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "m4a"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm"];

/// Every task a job can request.
///
/// Adding a kind requires a payload mapping in `dispatch::requests` and a
/// capability route in `Dispatcher::dispatch` (the match is exhaustive).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ParseDocument,
    ParseImage,
    ParseAudio,
    ParseVideo,
    ParseWeb,
}

impl TaskKind {
    /// Payload keys that must be present before the capability is invoked.
    pub fn required_keys(&self) -> &'static [&'static str] {
        match self {
            TaskKind::ParseDocument => &["content", "filename"],
            TaskKind::ParseImage => &["content", "filename", "task"],
            TaskKind::ParseAudio | TaskKind::ParseVideo => &["content", "filename"],
            TaskKind::ParseWeb => &["url"],
        }
    }

    /// Infer the task kind for a file from its extension.
    pub fn for_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        let extension = extension.as_str();

        if DOCUMENT_EXTENSIONS.contains(&extension) {
            Some(TaskKind::ParseDocument)
        } else if IMAGE_EXTENSIONS.contains(&extension) {
            Some(TaskKind::ParseImage)
        } else if AUDIO_EXTENSIONS.contains(&extension) {
            Some(TaskKind::ParseAudio)
        } else if VIDEO_EXTENSIONS.contains(&extension) {
            Some(TaskKind::ParseVideo)
        } else {
            None
        }
    }
}
