//! File classification for the compiler pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Classification of a source file, derived from its extension.
///
/// This is a closed set: the compiler dispatches exhaustively over it, so
/// every supported kind is testable and adding a kind is a compile-visible
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Markdown source (`.md`, `.markdown`, `.mk`).
    Markdown,
    /// HTML page or fragment.
    Html,
    /// CSS stylesheet.
    Css,
    /// JavaScript source.
    Javascript,
    /// Raster image.
    Image,
    /// Other plain text.
    Text,
    /// Anything else; bytes are stored as-is.
    Binary,
}

impl FileKind {
    /// Classifies a path by its extension (ASCII case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "md" | "markdown" | "mk" => FileKind::Markdown,
            "html" | "htm" => FileKind::Html,
            "css" => FileKind::Css,
            "js" | "mjs" => FileKind::Javascript,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "ico" => FileKind::Image,
            "txt" | "toml" | "yaml" | "yml" | "json" | "csv" => FileKind::Text,
            _ => FileKind::Binary,
        }
    }

    /// Returns true if the compiler produces derived artifacts for this kind.
    pub fn is_compilable(&self) -> bool {
        matches!(
            self,
            FileKind::Markdown | FileKind::Html | FileKind::Css | FileKind::Javascript
        )
    }
}
