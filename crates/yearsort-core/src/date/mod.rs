pub mod exif;
pub mod json;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use log::{debug, warn};

use crate::tools::MetadataExtractor;

/// Where a resolved date came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSource {
    Sidecar(PathBuf),
    Metadata(&'static str),
}

/// Best-known taken time of a media file, in the application offset.
#[derive(Debug, Clone)]
pub struct ResolvedDate {
    pub date: DateTime<FixedOffset>,
    pub source: DateSource,
}

impl ResolvedDate {
    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

/// Ordered fallback chain: sidecar timestamp, then extracted tags.
#[derive(Debug, Clone)]
pub struct DateResolver {
    offset: FixedOffset,
    max_year: i32,
}

impl DateResolver {
    /// Resolver accepting sidecar years up to next year.
    pub fn new(offset: FixedOffset) -> Self {
        let max_year = Utc::now().with_timezone(&offset).year() + 1;
        Self { offset, max_year }
    }

    pub fn with_max_year(mut self, max_year: i32) -> Self {
        self.max_year = max_year;
        self
    }

    pub fn offset(&self) -> &FixedOffset {
        &self.offset
    }

    /// Run the chain for one file. `candidates` must be in matcher order.
    pub fn resolve(
        &self,
        candidates: &[PathBuf],
        media_path: &Path,
        extractor: &dyn MetadataExtractor,
    ) -> Option<ResolvedDate> {
        // 1. First sidecar that parses to a non-empty record
        let selected = candidates.iter().find_map(|path| match json::load_sidecar(path) {
            Ok(Some(record)) => Some((path, record)),
            Ok(None) => {
                debug!("Empty sidecar {}", path.display());
                None
            }
            Err(e) => {
                warn!("Skipping sidecar: {:#}", e);
                None
            }
        });

        // 2. Its taken time, when sane
        if let Some((path, record)) = &selected {
            if let Some(date) = record.taken_time(&self.offset, self.max_year) {
                return Some(ResolvedDate {
                    date,
                    source: DateSource::Sidecar(path.to_path_buf()),
                });
            }
            debug!(
                "Sidecar {} has no usable taken time for {}",
                path.display(),
                media_path.display()
            );
        }

        // 3. Embedded / filesystem metadata
        let tags = match extractor.extract(media_path) {
            Ok(tags) => tags,
            Err(e) => {
                warn!("Metadata extraction failed for {}: {}", media_path.display(), e);
                return None;
            }
        };
        exif::first_tag_date(&tags, exif::RESOLVE_TAGS, &self.offset).map(|(tag, date)| ResolvedDate {
            date,
            source: DateSource::Metadata(tag),
        })
    }
}
