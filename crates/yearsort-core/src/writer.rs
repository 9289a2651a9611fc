use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, FixedOffset};
use filetime::FileTime;
use log::{debug, error, info};

use crate::date::ResolvedDate;
use crate::media::MediaFile;
use crate::tools::MetadataWriter;
use crate::Outcome;

/// Give up looking for a free name after this many suffixes.
const MAX_SUFFIX: u32 = 10_000;

/// The three directory roots of a run.
#[derive(Debug, Clone)]
pub struct Roots {
    pub input: PathBuf,
    pub output: PathBuf,
    pub quarantine: PathBuf,
}

/// `name_1.ext`, `name_2.ext`, ... for collision number `n` (0 = unchanged).
fn numbered_path(base: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let new_name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    base.with_file_name(new_name)
}

/// Claim the first free name derived from `dest` by creating it exclusively.
/// Two concurrent callers can never get the same path back.
fn claim_destination(dest: &Path) -> anyhow::Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    for n in 0..=MAX_SUFFIX {
        let candidate = numbered_path(dest, n);
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("claiming {}", candidate.display())),
        }
    }
    anyhow::bail!("no free name for {} after {} attempts", dest.display(), MAX_SUFFIX)
}

/// Replace the claimed placeholder with `src`. Falls back to copy+delete
/// across filesystems.
fn move_into_claim(src: &Path, claimed: &Path) -> io::Result<()> {
    match fs::rename(src, claimed) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Cross-device move, copying {}", src.display());
            fs::copy(src, claimed)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

/// Move `src` to `dest`, or to a numbered sibling if `dest` is taken.
/// Returns the final path.
pub fn move_file_safely(src: &Path, dest: &Path) -> anyhow::Result<PathBuf> {
    let claimed = claim_destination(dest)?;
    if let Err(e) = move_into_claim(src, &claimed) {
        let _ = fs::remove_file(&claimed);
        return Err(e).with_context(|| format!("moving {} to {}", src.display(), claimed.display()));
    }
    Ok(claimed)
}

/// Move without renumbering; fails if `dest` exists.
pub fn move_no_clobber(src: &Path, dest: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .with_context(|| format!("{} already exists", dest.display()))?;
    if let Err(e) = move_into_claim(src, dest) {
        let _ = fs::remove_file(dest);
        return Err(e).with_context(|| format!("moving {} to {}", src.display(), dest.display()));
    }
    Ok(())
}

/// Set access and modify time to `date`.
pub fn set_file_times(path: &Path, date: &DateTime<FixedOffset>) -> io::Result<()> {
    let ft = FileTime::from_unix_time(date.timestamp(), 0);
    filetime::set_file_times(path, ft, ft)
}

/// Decides where a media file goes and performs the move and rewrite.
pub struct Placer<'a> {
    roots: &'a Roots,
    writers: &'a [Box<dyn MetadataWriter>],
}

impl<'a> Placer<'a> {
    pub fn new(roots: &'a Roots, writers: &'a [Box<dyn MetadataWriter>]) -> Self {
        Self { roots, writers }
    }

    /// Quarantine path mirroring the file's location under the input root.
    pub fn quarantine_path(&self, media: &MediaFile) -> PathBuf {
        let rel = pathdiff::diff_paths(&media.path, &self.roots.input)
            .filter(|rel| !rel.starts_with(".."))
            .unwrap_or_else(|| PathBuf::from(&media.filename));
        self.roots.quarantine.join(rel)
    }

    pub fn year_path(&self, media: &MediaFile, resolved: &ResolvedDate) -> PathBuf {
        self.roots
            .output
            .join(resolved.year().to_string())
            .join(&media.filename)
    }

    pub fn place(&self, media: &MediaFile, resolved: Option<&ResolvedDate>) -> Outcome {
        if !media.is_supported() {
            info!("Skipping unsupported file {}", media.path.display());
            return Outcome::Skipped;
        }

        let Some(resolved) = resolved else {
            return match move_file_safely(&media.path, &self.quarantine_path(media)) {
                Ok(dest) => {
                    info!("No date for {}, quarantined at {}", media.path.display(), dest.display());
                    Outcome::DateUnknown
                }
                Err(e) => {
                    error!("Failed to quarantine {}: {:#}", media.path.display(), e);
                    Outcome::Error
                }
            };
        };

        let dest = match move_file_safely(&media.path, &self.year_path(media, resolved)) {
            Ok(dest) => dest,
            Err(e) => {
                error!("Failed to place {}: {:#}", media.path.display(), e);
                return Outcome::Error;
            }
        };
        debug!("{} -> {} ({:?})", media.path.display(), dest.display(), resolved.source);

        let mut outcome = Outcome::Success;
        if let Some(writer) = self.writers.iter().find(|w| w.supports(&media.extension)) {
            if let Err(e) = writer.write_capture_time(&dest, &resolved.date) {
                error!("Failed to rewrite capture time of {}: {}", dest.display(), e);
                outcome = Outcome::Error;
            }
        } else {
            debug!("No metadata writer for .{}, leaving {} as is", media.extension, dest.display());
        }

        // Last, so a rewrite cannot bump the modify time again
        if let Err(e) = set_file_times(&dest, &resolved.date) {
            error!("Failed to set file times on {}: {}", dest.display(), e);
            outcome = Outcome::Error;
        }
        outcome
    }
}
