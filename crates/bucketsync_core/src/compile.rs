//! The compiler pipeline: pure, idempotent derivation of artifacts.
//!
//! `compile` is a pure function of (file kind, raw bytes, config): identical
//! inputs always yield identical artifact bytes and therefore identical
//! compiled hashes, which is what lets the sync engine skip recompilation
//! when a source hash is unchanged.
//!
//! A failure deriving one variant is recorded in the outcome and never
//! blocks the other variants or the upload of the raw bytes.

use crate::classify::FileKind;
use crate::hash::{hash_bytes, ContentHash};
use pulldown_cmark::{html, Event, Options, Parser, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Variant name for rendered markdown.
pub const VARIANT_HTML: &str = "html";
/// Variant name for the plain-text excerpt of a markdown source.
pub const VARIANT_EXCERPT: &str = "excerpt";
/// Variant name for minified text assets.
pub const VARIANT_MIN: &str = "min";

/// Configuration for the compiler pipeline.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Maximum length, in characters, of the excerpt variant.
    pub excerpt_limit: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self { excerpt_limit: 280 }
    }
}

/// One derived artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// Artifact bytes.
    pub bytes: Vec<u8>,
    /// Hash of the artifact bytes.
    pub hash: ContentHash,
}

impl CompiledArtifact {
    fn new(bytes: Vec<u8>) -> Self {
        let hash = hash_bytes(&bytes);
        Self { bytes, hash }
    }
}

/// A failure deriving one variant of one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileFailure {
    /// The variant that failed.
    pub variant: String,
    /// Human-readable cause.
    pub message: String,
}

/// Result of compiling one source file.
#[derive(Debug, Clone, Default)]
pub struct CompileOutcome {
    /// Successfully derived artifacts by variant name.
    pub artifacts: BTreeMap<String, CompiledArtifact>,
    /// Variants that failed; retried on the next sync cycle.
    pub failures: Vec<CompileFailure>,
}

impl CompileOutcome {
    /// Returns the variant → hash map suitable for a record.
    pub fn compiled_hashes(&self) -> BTreeMap<String, ContentHash> {
        self.artifacts
            .iter()
            .map(|(variant, artifact)| (variant.clone(), artifact.hash))
            .collect()
    }

    fn push_artifact(&mut self, variant: &str, bytes: Vec<u8>) {
        self.artifacts
            .insert(variant.to_string(), CompiledArtifact::new(bytes));
    }

    fn push_failure(&mut self, variant: &str, message: impl Into<String>) {
        self.failures.push(CompileFailure {
            variant: variant.to_string(),
            message: message.into(),
        });
    }
}

/// Compiles a source file into zero or more derived artifacts.
///
/// Unsupported kinds yield an empty artifact map: the raw bytes remain the
/// only deliverable.
pub fn compile(path: &Path, raw: &[u8], config: &CompileConfig) -> CompileOutcome {
    let kind = FileKind::from_path(path);
    let mut outcome = CompileOutcome::default();

    match kind {
        FileKind::Markdown => {
            match std::str::from_utf8(raw) {
                Ok(text) => {
                    outcome.push_artifact(VARIANT_HTML, render_markdown(text).into_bytes());
                    outcome.push_artifact(
                        VARIANT_EXCERPT,
                        excerpt(text, config.excerpt_limit).into_bytes(),
                    );
                }
                Err(e) => {
                    outcome.push_failure(VARIANT_HTML, format!("invalid utf-8: {e}"));
                    outcome.push_failure(VARIANT_EXCERPT, format!("invalid utf-8: {e}"));
                }
            };
        }
        FileKind::Html | FileKind::Css | FileKind::Javascript => match std::str::from_utf8(raw) {
            Ok(text) => outcome.push_artifact(VARIANT_MIN, minify_text(text).into_bytes()),
            Err(e) => outcome.push_failure(VARIANT_MIN, format!("invalid utf-8: {e}")),
        },
        FileKind::Image | FileKind::Text | FileKind::Binary => {}
    }

    outcome
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_FOOTNOTES
}

fn render_markdown(text: &str) -> String {
    let parser = Parser::new_ext(text, markdown_options());
    let mut out = String::with_capacity(text.len() * 2);
    html::push_html(&mut out, parser);
    out
}

/// Plain text of the first paragraph, bounded to `limit` characters.
fn excerpt(text: &str, limit: usize) -> String {
    let parser = Parser::new_ext(text, markdown_options());
    let mut out = String::new();
    for event in parser {
        match event {
            Event::Text(t) | Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push(' '),
            Event::End(TagEnd::Paragraph) if !out.trim().is_empty() => break,
            _ => {}
        }
        if out.chars().count() >= limit {
            break;
        }
    }
    out.trim().chars().take(limit).collect()
}

/// Conservative whitespace minification: trims each line and drops blanks.
///
/// Deliberately lossy only about inter-line whitespace so the output stays
/// deterministic and safe for every dialect we classify as text assets.
fn minify_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(trimmed);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn md(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    #[test]
    fn markdown_produces_html_and_excerpt() {
        let raw = b"# Title\n\nFirst paragraph of the post.\n\nSecond paragraph.\n";
        let outcome = compile(&md("post.md"), raw, &CompileConfig::default());

        assert!(outcome.failures.is_empty());
        let html = outcome.artifacts.get(VARIANT_HTML).unwrap();
        let rendered = String::from_utf8(html.bytes.clone()).unwrap();
        assert!(rendered.contains("<h1>"));
        assert!(rendered.contains("First paragraph"));

        let excerpt = outcome.artifacts.get(VARIANT_EXCERPT).unwrap();
        let text = String::from_utf8(excerpt.bytes.clone()).unwrap();
        assert!(text.contains("Title") || text.contains("First paragraph"));
        assert!(!text.contains("<h1>"));
    }

    #[test]
    fn compile_is_deterministic() {
        let raw = b"*emphasis* and `code`\n";
        let a = compile(&md("a.md"), raw, &CompileConfig::default());
        let b = compile(&md("b.markdown"), raw, &CompileConfig::default());

        // Same kind and bytes: identical compiled hashes, regardless of path.
        assert_eq!(a.compiled_hashes(), b.compiled_hashes());
    }

    #[test]
    fn unsupported_kind_yields_empty_map() {
        let outcome = compile(
            &PathBuf::from("photo.png"),
            &[0x89, 0x50, 0x4E, 0x47],
            &CompileConfig::default(),
        );
        assert!(outcome.artifacts.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn invalid_utf8_records_failures_without_panicking() {
        let raw = [0xFF, 0xFE, 0x00, 0x41];
        let outcome = compile(&md("broken.md"), &raw, &CompileConfig::default());

        assert!(outcome.artifacts.is_empty());
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.failures.iter().any(|f| f.variant == VARIANT_HTML));
        assert!(outcome
            .failures
            .iter()
            .any(|f| f.variant == VARIANT_EXCERPT));
    }

    #[test]
    fn css_minification() {
        let raw = b"body {\n    color: red;\n}\n\n\n.a { }\n";
        let outcome = compile(&PathBuf::from("style.css"), raw, &CompileConfig::default());

        let min = outcome.artifacts.get(VARIANT_MIN).unwrap();
        let text = String::from_utf8(min.bytes.clone()).unwrap();
        assert_eq!(text, "body {\ncolor: red;\n}\n.a { }");
    }

    #[test]
    fn excerpt_is_bounded() {
        let long = format!("{}\n", "word ".repeat(500));
        let outcome = compile(
            &md("long.md"),
            long.as_bytes(),
            &CompileConfig { excerpt_limit: 40 },
        );
        let excerpt = outcome.artifacts.get(VARIANT_EXCERPT).unwrap();
        assert!(String::from_utf8(excerpt.bytes.clone()).unwrap().len() <= 40);
    }
}
