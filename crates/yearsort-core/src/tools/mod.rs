//! External collaborators: metadata extraction and embedded-date rewriting.
//!
//! The pipeline only sees the two traits below. [`exiftool`] and [`ffmpeg`]
//! shell out to the respective programs; [`native`] reads EXIF in-process
//! and is used when ExifTool is not installed.

pub mod exiftool;
pub mod ffmpeg;
pub mod native;

use std::collections::HashMap;
use std::path::Path;
use std::process::Output;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("unexpected output from {program}: {message}")]
    Output { program: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Turn a finished process into an error unless it exited cleanly.
    pub(crate) fn check(program: &str, output: Output) -> Result<Output, ToolError> {
        if output.status.success() {
            Ok(output)
        } else {
            Err(ToolError::Failed {
                program: program.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Reads tag name -> value pairs from a media file.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<HashMap<String, String>, ToolError>;
}

/// Rewrites the capture time embedded in a media file.
pub trait MetadataWriter: Send + Sync {
    /// Whether this writer can safely rewrite files with this (lowercase) extension.
    fn supports(&self, extension: &str) -> bool;

    fn write_capture_time(&self, path: &Path, date: &DateTime<FixedOffset>) -> Result<(), ToolError>;
}

/// Extractor that never finds anything, for runs without any metadata source.
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn extract(&self, _path: &Path) -> Result<HashMap<String, String>, ToolError> {
        Ok(HashMap::new())
    }
}
