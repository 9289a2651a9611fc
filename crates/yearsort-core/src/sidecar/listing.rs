use std::cell::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use crate::date::json;

/// Where directory snapshots come from. The filesystem in production, a
/// fixed table in tests.
pub trait ListingSource {
    /// Names of the `.json` files directly inside `dir`.
    fn sidecar_names(&self, dir: &Path) -> io::Result<Vec<String>>;
}

pub struct FsListing;

impl ListingSource for FsListing {
    fn sidecar_names(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.to_lowercase().ends_with(".json") && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// One sidecar in a directory snapshot.
#[derive(Debug)]
pub struct SidecarEntry {
    pub name: String,
    title: OnceCell<Option<String>>,
}

impl SidecarEntry {
    fn new(name: String) -> Self {
        Self { name, title: OnceCell::new() }
    }

    /// Declared `title`, read on first use. Malformed files yield `None`.
    pub fn title(&self, dir: &Path) -> Option<&str> {
        self.title
            .get_or_init(|| {
                let path = dir.join(&self.name);
                match json::load_sidecar(&path) {
                    Ok(record) => record.and_then(|r| r.title),
                    Err(e) => {
                        warn!("Unreadable sidecar: {:#}", e);
                        None
                    }
                }
            })
            .as_deref()
    }
}

/// Sidecar names of one directory, sorted by name.
#[derive(Debug, Default)]
pub struct DirListing {
    pub entries: Vec<SidecarEntry>,
}

/// Per-worker memo of directory listings. A directory is listed at most once
/// for the lifetime of the cache and never refreshed.
pub struct ListingCache<S = FsListing> {
    source: S,
    dirs: HashMap<PathBuf, DirListing>,
}

impl ListingCache<FsListing> {
    pub fn new() -> Self {
        Self::with_source(FsListing)
    }
}

impl Default for ListingCache<FsListing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ListingSource> ListingCache<S> {
    pub fn with_source(source: S) -> Self {
        Self { source, dirs: HashMap::new() }
    }

    pub fn listing(&mut self, dir: &Path) -> &DirListing {
        let source = &self.source;
        self.dirs.entry(dir.to_path_buf()).or_insert_with(|| {
            let mut names = source.sidecar_names(dir).unwrap_or_else(|e| {
                warn!("Cannot list sidecars in {}: {}", dir.display(), e);
                Vec::new()
            });
            names.sort();
            DirListing {
                entries: names.into_iter().map(SidecarEntry::new).collect(),
            }
        })
    }

    pub fn cached_dirs(&self) -> usize {
        self.dirs.len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::Cell;

    /// Fixed listings that count how often they are asked.
    pub struct FakeListing {
        pub names: HashMap<PathBuf, Vec<String>>,
        pub calls: Cell<usize>,
    }

    impl FakeListing {
        pub fn new(dir: &Path, names: &[&str]) -> Self {
            let mut map = HashMap::new();
            map.insert(dir.to_path_buf(), names.iter().map(|s| s.to_string()).collect());
            Self { names: map, calls: Cell::new(0) }
        }
    }

    impl ListingSource for FakeListing {
        fn sidecar_names(&self, dir: &Path) -> io::Result<Vec<String>> {
            self.calls.set(self.calls.get() + 1);
            self.names
                .get(dir)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such dir"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeListing;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_listing_computed_once() {
        let dir = Path::new("/takeout/Photos from 2020");
        let mut cache = ListingCache::with_source(FakeListing::new(dir, &["b.json", "a.json"]));

        let names: Vec<&str> = cache.listing(dir).entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
        cache.listing(dir);
        cache.listing(dir);
        assert_eq!(cache.source.calls.get(), 1);
        assert_eq!(cache.cached_dirs(), 1);
    }

    #[test]
    fn test_unlistable_dir_is_empty() {
        let mut cache = ListingCache::with_source(FakeListing::new(Path::new("/a"), &[]));
        assert!(cache.listing(Path::new("/missing")).entries.is_empty());
    }

    #[test]
    fn test_fs_listing_filters_json() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("IMG_1.jpg"), b"").unwrap();
        fs::write(dir.path().join("IMG_1.jpg.JSON"), b"{}").unwrap();
        fs::write(dir.path().join("metadata.json"), b"{}").unwrap();
        fs::create_dir(dir.path().join("folder.json")).unwrap();

        let mut cache = ListingCache::new();
        let names: Vec<&str> = cache.listing(dir.path()).entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["IMG_1.jpg.JSON", "metadata.json"]);
    }

    #[test]
    fn test_title_memoized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.json");
        fs::write(&path, r#"{"title":"IMG_0042.jpg"}"#).unwrap();

        let entry = SidecarEntry::new("x.json".to_string());
        assert_eq!(entry.title(dir.path()), Some("IMG_0042.jpg"));
        fs::remove_file(&path).unwrap();
        assert_eq!(entry.title(dir.path()), Some("IMG_0042.jpg"));

        let broken = SidecarEntry::new("missing.json".to_string());
        assert_eq!(broken.title(dir.path()), None);
    }
}
