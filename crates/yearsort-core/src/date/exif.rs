use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

/// Tags checked during resolution, most trusted first. File modify time is the last resort.
pub const RESOLVE_TAGS: &[&str] = &[
    "EXIF:DateTimeOriginal",
    "QuickTime:CreateDate",
    "CreationDate",
    "File:FileModifyDate",
];

/// Tags the quarantine sweep accepts as evidence of age.
pub const SWEEP_TAGS: &[&str] = &["EXIF:DateTimeOriginal", "QuickTime:CreateDate", "CreationDate"];

const FORMATS: &[&str] = &["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Find a tag in an extractor mapping.
///
/// Keys may or may not carry a group prefix (`EXIF:DateTimeOriginal` vs
/// `DateTimeOriginal`) depending on how the tool was invoked, so a grouped
/// name also matches its bare form and a bare name matches under any group.
pub fn lookup_tag<'a>(tags: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    if let Some(v) = tags.get(name) {
        return Some(v);
    }
    match name.split_once(':') {
        Some((_, bare)) => tags.get(bare).map(String::as_str),
        None => {
            let suffix = format!(":{}", name);
            let mut keys: Vec<&String> = tags.keys().filter(|k| k.ends_with(&suffix)).collect();
            keys.sort();
            keys.first().and_then(|k| tags.get(*k)).map(String::as_str)
        }
    }
}

/// Parse an extractor date string in `offset`. Anything past the seconds
/// (sub-seconds, zone suffix) is ignored.
pub fn parse_exif_datetime(s: &str, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let head: String = s.trim().chars().take(19).collect();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&head, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
}

/// First tag in `names` that is present and parses.
pub fn first_tag_date(
    tags: &HashMap<String, String>,
    names: &[&'static str],
    offset: &FixedOffset,
) -> Option<(&'static str, DateTime<FixedOffset>)> {
    names.iter().find_map(|name| {
        let raw = lookup_tag(tags, name)?;
        parse_exif_datetime(raw, offset).map(|dt| (*name, dt))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_formats() {
        let dt = parse_exif_datetime("2019:08:15 10:20:30", &jst()).unwrap();
        assert_eq!(dt.to_rfc3339(), "2019-08-15T10:20:30+09:00");
        let dt = parse_exif_datetime("2019-08-15 10:20:30", &jst()).unwrap();
        assert_eq!(dt.to_rfc3339(), "2019-08-15T10:20:30+09:00");
        assert!(parse_exif_datetime("2021:03:04 05:06:07+01:00", &jst()).is_some());
        assert!(parse_exif_datetime("0000:00:00 00:00:00", &jst()).is_none());
        assert!(parse_exif_datetime("yesterday", &jst()).is_none());
    }

    #[test]
    fn test_lookup_grouping() {
        let t = tags(&[("DateTimeOriginal", "a"), ("QuickTime:CreationDate", "b")]);
        assert_eq!(lookup_tag(&t, "EXIF:DateTimeOriginal"), Some("a"));
        assert_eq!(lookup_tag(&t, "CreationDate"), Some("b"));
        assert_eq!(lookup_tag(&t, "File:FileModifyDate"), None);
    }

    #[test]
    fn test_first_tag_skips_unparseable() {
        let t = tags(&[
            ("EXIF:DateTimeOriginal", "0000:00:00 00:00:00"),
            ("QuickTime:CreateDate", "2018:01:02 03:04:05"),
            ("File:FileModifyDate", "2024:01:01 00:00:00+09:00"),
        ]);
        let (tag, dt) = first_tag_date(&t, RESOLVE_TAGS, &jst()).unwrap();
        assert_eq!(tag, "QuickTime:CreateDate");
        assert_eq!(dt.to_rfc3339(), "2018-01-02T03:04:05+09:00");
    }
}
