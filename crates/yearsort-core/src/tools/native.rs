use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, FixedOffset, Utc};
use exif::{In, Reader, Tag};
use log::debug;

use super::{MetadataExtractor, ToolError};

/// EXIF tags mapped onto the ExifTool names the resolver looks up.
const EXIF_TAGS: &[(Tag, &str)] = &[
    (Tag::DateTimeOriginal, "EXIF:DateTimeOriginal"),
    (Tag::DateTimeDigitized, "EXIF:CreateDate"),
    (Tag::DateTime, "EXIF:ModifyDate"),
];

/// In-process extractor for when ExifTool is unavailable. Reads EXIF from
/// still-image containers and reports the filesystem modify time.
#[derive(Debug, Clone)]
pub struct NativeExif {
    offset: FixedOffset,
}

impl NativeExif {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

fn read_exif_tags(path: &Path, tags: &mut HashMap<String, String>) -> Result<(), exif::Error> {
    let file = File::open(path)?;
    let reader = Reader::new().read_from_container(&mut BufReader::new(file))?;
    for (tag, name) in EXIF_TAGS {
        if let Some(field) = reader.get_field(*tag, In::PRIMARY) {
            tags.insert(name.to_string(), field.display_value().to_string());
        }
    }
    Ok(())
}

impl MetadataExtractor for NativeExif {
    fn extract(&self, path: &Path) -> Result<HashMap<String, String>, ToolError> {
        let modified = fs::metadata(path)?.modified()?;
        let mut tags = HashMap::new();
        tags.insert(
            "File:FileModifyDate".to_string(),
            DateTime::<Utc>::from(modified)
                .with_timezone(&self.offset)
                .format("%Y:%m:%d %H:%M:%S%:z")
                .to_string(),
        );

        if let Err(e) = read_exif_tags(path, &mut tags) {
            debug!("No EXIF in {}: {}", path.display(), e);
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::exif::parse_exif_datetime;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::tempdir;

    #[test]
    fn test_file_modify_date_without_exif() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"not really a video").unwrap();
        // 2021-06-01T00:00:00Z
        set_file_mtime(&path, FileTime::from_unix_time(1622505600, 0)).unwrap();

        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let tags = NativeExif::new(offset).extract(&path).unwrap();
        assert_eq!(tags["File:FileModifyDate"], "2021:06:01 09:00:00+09:00");
        assert!(!tags.contains_key("EXIF:DateTimeOriginal"));
        let dt = parse_exif_datetime(&tags["File:FileModifyDate"], &offset).unwrap();
        assert_eq!(dt.timestamp(), 1622505600);
    }

    #[test]
    fn test_missing_file_is_error() {
        let offset = FixedOffset::east_opt(0).unwrap();
        assert!(NativeExif::new(offset).extract(Path::new("/nonexistent/a.jpg")).is_err());
    }
}
