use std::path::{Path, PathBuf};

use crate::extras;

/// Extensions (lowercase, no dot) the pipeline will relocate.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "arw", "dng", "gif", "heic", "jpeg", "jpg", "m4v", "mov", "mp4", "nef", "png", "rw2", "webp",
];

/// Video containers; Takeout often names their sidecars after a still image.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v"];

#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Full path of the file on disk
    pub path: PathBuf,
    /// Directory holding the file (and its sidecars)
    pub dir: PathBuf,
    /// Just the filename
    pub filename: String,
    /// Lowercase extension without the dot, empty if none
    pub extension: String,
    /// Stem with any "-edited" style suffix removed, used for sidecar matching
    pub match_name: String,
}

impl MediaFile {
    pub fn new(path: &Path) -> Option<Self> {
        let filename = path.file_name()?.to_string_lossy().into_owned();
        let stem = Path::new(&filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.clone());
        let extension = Path::new(&filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Some(Self {
            path: path.to_path_buf(),
            dir,
            match_name: extras::strip_edited_marker(&stem),
            filename,
            extension,
        })
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_EXTENSIONS.contains(&self.extension.as_str())
    }

    pub fn is_video(&self) -> bool {
        VIDEO_EXTENSIONS.contains(&self.extension.as_str())
    }
}
