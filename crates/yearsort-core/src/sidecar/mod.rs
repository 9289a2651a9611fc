pub mod listing;
pub mod patterns;

use std::path::PathBuf;

use log::debug;

use crate::media::MediaFile;
pub use listing::{FsListing, ListingCache, ListingSource};

/// Candidate sidecars for `media`, in the order they should be tried.
///
/// Structural matches come first (by rule priority), then sidecars whose
/// declared title starts with the media name, then duplicate-marker
/// matches. Within a tier, listing order (sorted by name) is kept.
pub fn find_sidecars<S: ListingSource>(media: &MediaFile, cache: &mut ListingCache<S>) -> Vec<PathBuf> {
    let listing = cache.listing(&media.dir);
    if listing.entries.is_empty() {
        return Vec::new();
    }

    let name = media.match_name.as_str();
    let primary = patterns::primary_patterns(name, &media.extension);
    let supplemental = patterns::supplemental_patterns(name, &media.extension);

    let mut ranked: Vec<(usize, usize)> = Vec::new();
    let title_rank = primary.len();
    let supplemental_rank = title_rank + 1;

    for (pos, entry) in listing.entries.iter().enumerate() {
        if let Some(rank) = primary.iter().position(|(_, re)| re.is_match(&entry.name)) {
            debug!("{} -> {} ({})", media.filename, entry.name, primary[rank].0);
            ranked.push((rank, pos));
        } else if entry.title(&media.dir).is_some_and(|t| t.starts_with(name)) {
            debug!("{} -> {} (title)", media.filename, entry.name);
            ranked.push((title_rank, pos));
        } else if supplemental.iter().any(|re| re.is_match(&entry.name)) {
            debug!("{} -> {} (duplicate marker)", media.filename, entry.name);
            ranked.push((supplemental_rank, pos));
        }
    }

    ranked.sort_unstable();
    ranked
        .into_iter()
        .map(|(_, pos)| media.dir.join(&listing.entries[pos].name))
        .collect()
}
