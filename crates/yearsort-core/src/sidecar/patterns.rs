//! Filename patterns tying a media file to its Takeout JSON sidecar.
//!
//! Takeout truncates long names, appends `.supplemental-metadata` (or a
//! truncated form of it), moves the `(n)` duplicate marker after the
//! extension and attaches video sidecars to a still-image name. Each rule is
//! a pure function from `(name, ext)` to a regex source, tried in order.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::media::VIDEO_EXTENSIONS;

/// `name` is the stem with the edited marker stripped, `ext` the lowercase
/// extension without the dot.
pub type PatternRule = fn(name: &str, ext: &str) -> Option<String>;

/// Primary rules, highest priority first.
pub const PRIMARY_RULES: &[(&'static str, PatternRule)] = &[
    ("exact", exact),
    ("with-extension", with_extension),
    ("any-suffix", any_suffix),
    ("hex-id", hex_id),
    ("known-extension", known_extension),
    ("numbered", numbered),
    ("still-for-video", still_for_video),
];

static DUPLICATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*)\((\d+)\)$").unwrap());

fn esc(s: &str) -> String {
    regex::escape(s)
}

/// `name.json`
fn exact(name: &str, _ext: &str) -> Option<String> {
    Some(format!(r"^{}\.json$", esc(name)))
}

/// `name.ext.json`, `name.ext.supplemental-metadata.json`
fn with_extension(name: &str, ext: &str) -> Option<String> {
    if ext.is_empty() {
        return None;
    }
    Some(format!(r"^{}\.{}(\..*?)?\.json$", esc(name), esc(ext)))
}

/// `name.<anything>.json`, covers truncated and rotated suffixes
fn any_suffix(name: &str, _ext: &str) -> Option<String> {
    Some(format!(r"^{}(\..*?)?\.json$", esc(name)))
}

/// `name.<hex>.json`
fn hex_id(name: &str, _ext: &str) -> Option<String> {
    Some(format!(r"^{}(\.[0-9a-f]+)?\.json$", esc(name)))
}

/// `name.jpg.json` where the sidecar names a different common extension
fn known_extension(name: &str, _ext: &str) -> Option<String> {
    Some(format!(r"^{}\.(heic|jpg|jpeg|png|mp4|mov|m4v)(\..*?)?\.json$", esc(name)))
}

/// `name.<digits>.json`
fn numbered(name: &str, _ext: &str) -> Option<String> {
    Some(format!(r"^{}\.[0-9]+\.json$", esc(name)))
}

/// Videos whose sidecar was written for the adjacent still image.
fn still_for_video(name: &str, ext: &str) -> Option<String> {
    if !VIDEO_EXTENSIONS.contains(&ext) {
        return None;
    }
    Some(format!(r"^{}\.(heic|jpg|jpeg)(\..*?)?(\(\d+\))?\.json$", esc(name)))
}

/// Rules for `base(n)` names whose sidecar is `base.ext(n).json` or
/// `base.jpg.<word>(n).json`. Empty unless the name ends with `(n)`.
pub fn supplemental_sources(name: &str, ext: &str) -> Vec<String> {
    let Some(caps) = DUPLICATE_RE.captures(name) else {
        return Vec::new();
    };
    let base = esc(&caps[1]);
    let idx = &caps[2];
    let mut sources = vec![format!(r"^{}\.jpg(?:\.[^.]+)?\({}\)\.json$", base, idx)];
    if !ext.is_empty() && ext != "jpg" {
        sources.push(format!(r"^{}\.{}(?:\.[^.]+)?\({}\)\.json$", base, esc(ext), idx));
    }
    sources
}

/// Compile a rule source; matching is always case-insensitive.
pub fn compile(source: &str) -> Option<Regex> {
    RegexBuilder::new(source).case_insensitive(true).build().ok()
}

/// The compiled primary patterns for one media file, in priority order,
/// tagged with their rule name.
pub fn primary_patterns(name: &str, ext: &str) -> Vec<(&'static str, Regex)> {
    PRIMARY_RULES
        .iter()
        .filter_map(|(label, rule)| Some((*label, compile(&rule(name, ext)?)?)))
        .collect()
}

pub fn supplemental_patterns(name: &str, ext: &str) -> Vec<Regex> {
    supplemental_sources(name, ext)
        .iter()
        .filter_map(|src| compile(src))
        .collect()
}
