use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, FixedOffset, SecondsFormat};

use super::{MetadataWriter, ToolError};
use crate::media::VIDEO_EXTENSIONS;

/// Rewrites the container `creation_time` of videos by remuxing with ffmpeg.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

/// Sibling path ffmpeg writes into; keeps the extension so the muxer is chosen correctly.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    path.with_file_name(format!(".{}.remux.{}", name, ext))
}

impl MetadataWriter for Ffmpeg {
    fn supports(&self, extension: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&extension)
    }

    fn write_capture_time(&self, path: &Path, date: &DateTime<FixedOffset>) -> Result<(), ToolError> {
        let program = self.program.display().to_string();
        let temp = temp_path(path);
        let creation_time = format!("creation_time={}", date.to_rfc3339_opts(SecondsFormat::Secs, false));

        let result = Command::new(&self.program)
            .args([OsStr::new("-y"), OsStr::new("-loglevel"), OsStr::new("error"), OsStr::new("-i")])
            .arg(path)
            .args(["-map_metadata", "0", "-metadata", &creation_time, "-codec", "copy"])
            .arg(&temp)
            .output()
            .map_err(|source| ToolError::Spawn { program: program.clone(), source })
            .and_then(|output| ToolError::check(&program, output));

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        fs::rename(&temp, path)?;
        Ok(())
    }
}
