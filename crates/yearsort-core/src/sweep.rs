use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::date::exif::{self, SWEEP_TAGS};
use crate::tools::MetadataExtractor;
use crate::writer::move_no_clobber;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub promoted: u64,
    pub retained: u64,
    pub failed: u64,
}

/// Re-evaluates quarantined files and promotes the ones old enough.
pub struct Sweep<'a> {
    pub quarantine: &'a Path,
    pub output: &'a Path,
    pub extractor: &'a dyn MetadataExtractor,
    pub offset: FixedOffset,
    /// Files older than this are promoted
    pub cutoff: DateTime<FixedOffset>,
}

impl<'a> Sweep<'a> {
    pub fn new(
        quarantine: &'a Path,
        output: &'a Path,
        extractor: &'a dyn MetadataExtractor,
        offset: FixedOffset,
        cutoff_days: u32,
    ) -> Self {
        let cutoff = Utc::now().with_timezone(&offset) - Duration::days(i64::from(cutoff_days));
        Self { quarantine, output, extractor, offset, cutoff }
    }

    pub fn run(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        if !self.quarantine.is_dir() {
            debug!("No quarantine at {}, nothing to sweep", self.quarantine.display());
            return summary;
        }

        let files: Vec<PathBuf> = WalkDir::new(self.quarantine)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Sweep walk error: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        for path in files {
            match self.sweep_file(&path) {
                Ok(Some(dest)) => {
                    info!("Promoted {} -> {}", path.display(), dest.display());
                    summary.promoted += 1;
                }
                Ok(None) => summary.retained += 1,
                Err(e) => {
                    warn!("Failed to promote {}: {:#}", path.display(), e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    fn modified(&self, path: &Path) -> anyhow::Result<DateTime<FixedOffset>> {
        let modified = fs::metadata(path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified).with_timezone(&self.offset))
    }

    /// Any extracted date older than the cutoff. Extraction errors count as no data.
    fn has_old_metadata(&self, path: &Path) -> bool {
        let tags = match self.extractor.extract(path) {
            Ok(tags) => tags,
            Err(e) => {
                debug!("No metadata for {}: {}", path.display(), e);
                return false;
            }
        };
        SWEEP_TAGS.iter().any(|name| {
            exif::lookup_tag(&tags, name)
                .and_then(|raw| exif::parse_exif_datetime(raw, &self.offset))
                .is_some_and(|dt| dt < self.cutoff)
        })
    }

    fn sweep_file(&self, path: &Path) -> anyhow::Result<Option<PathBuf>> {
        let mtime = self.modified(path).context("reading modify time")?;
        let eligible = mtime < self.cutoff || self.has_old_metadata(path);
        if !eligible {
            return Ok(None);
        }

        let rel = path.strip_prefix(self.quarantine)?;
        let dest = self.output.join(mtime.year().to_string()).join(rel);
        move_no_clobber(path, &dest)?;
        Ok(Some(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::FakeExtractor;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::tempdir;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn touch(path: &Path, mtime: i64) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
        set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    #[test]
    fn test_old_mtime_promoted() {
        let dir = tempdir().unwrap();
        let q = dir.path().join("out/date_unknown");
        let out = dir.path().join("out");
        // 2015-03-01T00:00:00Z
        touch(&q.join("Album/IMG_9.png"), 1425168000);
        let extractor = FakeExtractor::empty();

        let summary = Sweep::new(&q, &out, &extractor, jst(), 30).run();
        assert_eq!(summary, SweepSummary { promoted: 1, retained: 0, failed: 0 });
        assert!(out.join("2015/Album/IMG_9.png").exists());
        assert!(!q.join("Album/IMG_9.png").exists());
    }

    #[test]
    fn test_recent_file_retained_unless_metadata_is_old() {
        let dir = tempdir().unwrap();
        let q = dir.path().join("q");
        let out = dir.path().join("out");
        let now = Utc::now().timestamp();
        touch(&q.join("fresh.jpg"), now);

        let extractor = FakeExtractor::empty();
        let summary = Sweep::new(&q, &out, &extractor, jst(), 30).run();
        assert_eq!(summary.retained, 1);
        assert!(q.join("fresh.jpg").exists());

        let extractor = FakeExtractor::with_tag("EXIF:DateTimeOriginal", "2012:01:01 00:00:00");
        let summary = Sweep::new(&q, &out, &extractor, jst(), 30).run();
        assert_eq!(summary.promoted, 1);
        // Year comes from the modify time, not the tag
        let year = Utc::now().with_timezone(&jst()).year();
        assert!(out.join(year.to_string()).join("fresh.jpg").exists());
    }

    #[test]
    fn test_collision_counts_as_failure() {
        let dir = tempdir().unwrap();
        let q = dir.path().join("q");
        let out = dir.path().join("out");
        touch(&q.join("a.jpg"), 1425168000);
        touch(&q.join("b.jpg"), 1425168000);
        fs::create_dir_all(out.join("2015")).unwrap();
        fs::write(out.join("2015/a.jpg"), b"existing").unwrap();

        let extractor = FakeExtractor::failing();
        let summary = Sweep::new(&q, &out, &extractor, jst(), 30).run();
        assert_eq!(summary, SweepSummary { promoted: 1, retained: 0, failed: 1 });
        assert!(q.join("a.jpg").exists());
        assert_eq!(fs::read(out.join("2015/a.jpg")).unwrap(), b"existing");
    }

    #[test]
    fn test_missing_quarantine_is_empty() {
        let dir = tempdir().unwrap();
        let extractor = FakeExtractor::empty();
        let summary = Sweep::new(&dir.path().join("nope"), dir.path(), &extractor, jst(), 30).run();
        assert_eq!(summary, SweepSummary::default());
    }
}
