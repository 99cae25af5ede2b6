//! Compile command implementation.

use bucketsync_core::{compile, CompileConfig, FileKind};
use serde::Serialize;
use std::path::Path;

/// Result of compiling one file.
#[derive(Debug, Serialize)]
pub struct CompileResult {
    /// Source file path.
    pub path: String,
    /// Classified kind.
    pub kind: String,
    /// Source size in bytes.
    pub source_size: usize,
    /// Plaintext content hash of the source.
    pub content_hash: String,
    /// Derived artifacts by variant name.
    pub artifacts: Vec<ArtifactLine>,
    /// Variants that failed to compile.
    pub failures: Vec<FailureLine>,
}

/// One derived artifact.
#[derive(Debug, Serialize)]
pub struct ArtifactLine {
    /// Variant name ("html", "excerpt", "min").
    pub variant: String,
    /// Artifact size in bytes.
    pub size: usize,
    /// Artifact content hash.
    pub hash: String,
}

/// One failed variant.
#[derive(Debug, Serialize)]
pub struct FailureLine {
    /// Variant name.
    pub variant: String,
    /// Failure message.
    pub message: String,
}

/// Runs the compile command.
pub fn run(
    file: &Path,
    excerpt_limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read(file)?;

    let mut config = CompileConfig::default();
    if let Some(limit) = excerpt_limit {
        config.excerpt_limit = limit;
    }
    let outcome = compile(file, &raw, &config);
    tracing::debug!(
        file = %file.display(),
        artifacts = outcome.artifacts.len(),
        failures = outcome.failures.len(),
        "compiled"
    );

    let result = CompileResult {
        path: file.display().to_string(),
        kind: format!("{:?}", FileKind::from_path(file)),
        source_size: raw.len(),
        content_hash: bucketsync_core::hash::hash_bytes(&raw).to_hex(),
        artifacts: outcome
            .artifacts
            .iter()
            .map(|(variant, artifact)| ArtifactLine {
                variant: variant.clone(),
                size: artifact.bytes.len(),
                hash: artifact.hash.to_hex(),
            })
            .collect(),
        failures: outcome
            .failures
            .iter()
            .map(|failure| FailureLine {
                variant: failure.variant.clone(),
                message: failure.message.clone(),
            })
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &CompileResult) {
    println!("Compile: {}", result.path);
    println!("  Kind:   {}", result.kind);
    println!("  Source: {} bytes, {}", result.source_size, result.content_hash);

    if result.artifacts.is_empty() {
        println!("  No derived artifacts for this kind.");
    } else {
        println!("  Artifacts:");
        for artifact in &result.artifacts {
            println!(
                "    {:8} {:>8} bytes  {}",
                artifact.variant, artifact.size, artifact.hash
            );
        }
    }

    for failure in &result.failures {
        println!("  FAILED {}: {}", failure.variant, failure.message);
    }
}
