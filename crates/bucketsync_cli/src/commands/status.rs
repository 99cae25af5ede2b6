//! Status command implementation.

use bucketsync_client::{diff, scan, Manifest};
use serde::Serialize;
use std::path::Path;

/// What a status run found.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Sync root that was scanned.
    pub path: String,
    /// Last-synced bucket revision from the manifest.
    pub revision: u64,
    /// Paths tracked by the manifest.
    pub tracked: usize,
    /// Files found on disk.
    pub scanned: usize,
    /// Pending changes.
    pub changes: Vec<ChangeLine>,
}

/// One pending change.
#[derive(Debug, Serialize)]
pub struct ChangeLine {
    /// Path relative to the sync root.
    pub path: String,
    /// "upsert" or "delete".
    pub action: &'static str,
}

/// Runs the status command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("Not a directory: {:?}", path).into());
    }

    let manifest = Manifest::load(path);
    let scanned = scan(path, &manifest)?;
    let changes = diff(&scanned, &manifest);

    let result = StatusResult {
        path: path.display().to_string(),
        revision: manifest.revision,
        tracked: manifest.len(),
        scanned: scanned.len(),
        changes: changes
            .iter()
            .map(|change| ChangeLine {
                path: change.path().to_string(),
                action: if change.is_delete() { "delete" } else { "upsert" },
            })
            .collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &StatusResult) {
    println!("bucketsync status");
    println!("=================");
    println!();
    println!("Path:     {}", result.path);
    println!("Revision: {}", result.revision);
    println!("Tracked:  {} paths", result.tracked);
    println!("On disk:  {} files", result.scanned);
    println!();

    if result.changes.is_empty() {
        println!("Nothing to sync.");
        return;
    }

    println!("Pending changes:");
    for change in &result.changes {
        println!("  {:6}  {}", change.action, change.path);
    }

    // summary line
    let deletes = result.changes.iter().filter(|c| c.action == "delete").count();
    println!();
    println!(
        "{} upsert(s), {} delete(s)",
        result.changes.len() - deletes,
        deletes
    );
}
