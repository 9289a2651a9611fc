use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, FixedOffset};
use log::debug;
use serde_json::Value;

use super::{MetadataExtractor, MetadataWriter, ToolError};

/// Formats ExifTool can rewrite in place without risk to the container.
const WRITABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff"];

/// Wrapper around the `exiftool` executable.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn name(&self) -> String {
        self.program.display().to_string()
    }

    fn run(&self, args: &[&OsStr]) -> Result<std::process::Output, ToolError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| ToolError::Spawn { program: self.name(), source })?;
        ToolError::check(&self.name(), output)
    }

    /// Returns the installed version, failing when the program is unusable.
    pub fn version(&self) -> Result<String, ToolError> {
        let output = self.run(&[OsStr::new("-ver")])?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Flatten the first object of `exiftool -json` output into strings.
fn parse_json_output(program: &str, stdout: &[u8]) -> Result<HashMap<String, String>, ToolError> {
    let text = String::from_utf8_lossy(stdout);
    let data: Vec<HashMap<String, Value>> =
        serde_json::from_str(&text).map_err(|e| ToolError::Output {
            program: program.to_string(),
            message: e.to_string(),
        })?;
    let Some(first) = data.into_iter().next() else {
        return Ok(HashMap::new());
    };
    Ok(first
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            Value::Number(n) => Some((k, n.to_string())),
            _ => None,
        })
        .collect())
}

impl MetadataExtractor for ExifTool {
    fn extract(&self, path: &Path) -> Result<HashMap<String, String>, ToolError> {
        let output = self.run(&[
            OsStr::new("-json"),
            OsStr::new("-G"),
            OsStr::new("-charset"),
            OsStr::new("filename=UTF8"),
            path.as_os_str(),
        ])?;
        let tags = parse_json_output(&self.name(), &output.stdout)?;
        debug!("exiftool read {} tags from {}", tags.len(), path.display());
        Ok(tags)
    }
}

impl MetadataWriter for ExifTool {
    fn supports(&self, extension: &str) -> bool {
        WRITABLE_EXTENSIONS.contains(&extension)
    }

    fn write_capture_time(&self, path: &Path, date: &DateTime<FixedOffset>) -> Result<(), ToolError> {
        let all_dates = format!("-AllDates={}", date.format("%Y:%m:%d %H:%M:%S"));
        self.run(&[
            OsStr::new(&all_dates),
            OsStr::new("-overwrite_original"),
            path.as_os_str(),
        ])?;
        Ok(())
    }
}
