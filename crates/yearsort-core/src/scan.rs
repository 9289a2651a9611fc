use std::path::{Path, PathBuf};

use anyhow::Context;
use log::warn;
use walkdir::WalkDir;

use crate::{ThrottledProgress, UNKNOWN_TOTAL};

fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Every regular non-sidecar file under `input`, skipping anything inside
/// `exclude` (output and quarantine may live under the input root).
/// Sorted for stable progress output.
pub fn collect_files(input: &Path, exclude: &[&Path], progress: &ThrottledProgress) -> anyhow::Result<Vec<PathBuf>> {
    let root = std::fs::metadata(input).with_context(|| format!("reading input root {}", input.display()))?;
    anyhow::ensure!(root.is_dir(), "{} is not a directory", input.display());

    let mut files = Vec::new();
    let walker = WalkDir::new(input)
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|ex| e.path() == *ex));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Scan error: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && !is_sidecar(entry.path()) {
            files.push(entry.into_path());
            progress.report("scan", files.len() as u64, UNKNOWN_TOTAL, "Scanning input");
        }
    }
    files.sort();
    Ok(files)
}
