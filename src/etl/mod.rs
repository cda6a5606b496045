/// ETL Pipeline Module
///
/// This module holds the stages of the Extract, Transform, Load pipeline:
/// - Extract: paginate the RAWG API and checkpoint raw JSON to disk
/// - Transform: flatten raw records into normalized game rows
/// - Snapshot: persist one batch as an immutable columnar file
/// - Load: batched upsert into the remote table and windowed read-back
pub mod extract;
pub mod load;
pub mod snapshot;
pub mod transform;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Find the file with the lexicographically greatest name matching
/// `prefix`/`suffix` in `dir`.
///
/// Filenames embed sortable timestamps, so name order is creation order.
/// This is deliberate: modification time changes when files are copied or
/// moved, filenames do not. Returns Ok(None) when the directory does not
/// exist or holds no matching file.
pub fn latest_file(dir: &Path, prefix: &str, suffix: &str) -> Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read directory {}", dir.display())),
    };

    let mut best: Option<(String, PathBuf)> = None;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read directory entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) || !name.ends_with(suffix) {
            continue;
        }
        if best.as_ref().map(|(top, _)| name > *top).unwrap_or(true) {
            best = Some((name, entry.path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_file_orders_by_name_not_mtime() {
        let dir = tempfile::tempdir().unwrap();

        // Written newest-name first: mtime order disagrees with name order.
        fs::write(dir.path().join("raw_2025-09-03.json"), b"{}").unwrap();
        fs::write(dir.path().join("raw_2025-09-01.json"), b"{}").unwrap();
        fs::write(dir.path().join("raw_2025-09-02.json"), b"{}").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"").unwrap();

        let latest = latest_file(dir.path(), "raw_", ".json").unwrap().unwrap();
        assert_eq!(latest.file_name().unwrap().to_string_lossy(), "raw_2025-09-03.json");
    }

    #[test]
    fn test_latest_file_missing_directory_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-here");

        assert!(latest_file(&missing, "raw_", ".json").unwrap().is_none());
    }
}
