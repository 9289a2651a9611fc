use unicode_normalization::UnicodeNormalization;

/// Suffixes Takeout appends to the edited copy of a photo, per UI language.
/// The edited copy ships without a sidecar of its own, so its name is
/// matched as if the marker were absent. Generated creations ("-effects",
/// "-mix", ...) carry their own sidecars and are not listed.
const EDITED_MARKERS: &[&str] = &[
    "-bearbeitet",
    "-bewerkt",
    "-editat",
    "-edited",
    "-edytowane",
    "-ha editado",
    "-modificato",
    "-modifié",
    "-編集済み",
];

/// The stem used for sidecar matching: NFC-normalized, with one trailing
/// edited marker removed (case-insensitively).
pub fn strip_edited_marker(stem: &str) -> String {
    let normalized: String = stem.nfc().collect();
    let lower = normalized.to_lowercase();
    match EDITED_MARKERS.iter().find(|marker| lower.ends_with(**marker)) {
        Some(marker) => {
            // Lowercasing can change byte lengths
            let keep = normalized.chars().count() - marker.chars().count();
            normalized.chars().take(keep).collect()
        }
        None => normalized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_edited_marker() {
        assert_eq!(strip_edited_marker("IMG_1234-edited"), "IMG_1234");
        assert_eq!(strip_edited_marker("IMG_1234-EDITED"), "IMG_1234");
        assert_eq!(strip_edited_marker("写真-編集済み"), "写真");
        assert_eq!(strip_edited_marker("IMG_1234(1)"), "IMG_1234(1)");
        assert_eq!(strip_edited_marker("my-edited-trip"), "my-edited-trip");
    }

    #[test]
    fn test_localized_markers() {
        assert_eq!(strip_edited_marker("PXL_2021-bearbeitet"), "PXL_2021");
        assert_eq!(strip_edited_marker("photo-modifié"), "photo");
        assert_eq!(strip_edited_marker("foto-ha editado"), "foto");
    }

    #[test]
    fn test_creations_keep_their_name() {
        assert_eq!(strip_edited_marker("IMG_1234-effects"), "IMG_1234-effects");
        assert_eq!(strip_edited_marker("IMG_1234-mix"), "IMG_1234-mix");
    }

    #[test]
    fn test_decomposed_input_is_normalized() {
        // "e" + combining acute
        assert_eq!(strip_edited_marker("photo-modifie\u{301}"), "photo");
    }
}
