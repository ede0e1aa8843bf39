//! Mapping of untrusted asset keys onto relative cache paths

use std::path::PathBuf;

const PLACEHOLDER: char = '_';

/// Characters rejected in a file name on at least one supported platform.
/// Using the union keeps a cache directory portable between hosts.
fn is_invalid_file_name_char(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control()
}

fn sanitize_segment(segment: &str) -> String {
    if segment.chars().all(|c| c == '.') {
        return segment.replace('.', "_");
    }
    segment
        .chars()
        .map(|c| {
            if is_invalid_file_name_char(c) {
                PLACEHOLDER
            } else {
                c
            }
        })
        .collect()
}

/// Map an asset key to a path relative to the cache root.
///
/// Both `/` and `\` separate segments. Empty and `.` segments are dropped,
/// dot-only segments such as `..` have their dots replaced, and every other
/// invalid character becomes `_`. The result never contains a root, prefix
/// or parent component, so joining it onto the cache root cannot escape it.
/// A key with no usable segments yields an empty path.
pub fn sanitize_key(key: &str) -> PathBuf {
    key.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(sanitize_segment)
        .collect()
}
