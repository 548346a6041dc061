//! Filename parsing for the `NNN-name` convention.
//!
//! Captured frames are written as `001-original.png`, `002-original.png`,
//! `001-retake.png`, ... and the directory camera reads its feed in the same
//! order. Both sides go through this module so the numbering stays consistent.

use std::cmp::Ordering;
use std::path::Path;

/// Result of parsing a numbered entry name like `003-retake`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    /// Number prefix if present (e.g., `3` from `003-retake`)
    pub number: Option<u32>,
    /// Name part after `NNN-`. Empty if number-only.
    /// For unnumbered entries, this is the full input.
    pub name: String,
}

/// Parse an entry name following the `NNN-name` convention.
///
/// - `"003-retake"` → number=Some(3), name="retake"
/// - `"001"` → number=Some(1), name=""
/// - `"snapshot"` → number=None, name="snapshot"
pub fn parse_entry_name(name: &str) -> ParsedName {
    if let Some(dash_pos) = name.find('-')
        && let Ok(num) = name[..dash_pos].parse::<u32>()
    {
        return ParsedName {
            number: Some(num),
            name: name[dash_pos + 1..].to_string(),
        };
    }
    if let Ok(num) = name.parse::<u32>() {
        return ParsedName {
            number: Some(num),
            name: String::new(),
        };
    }
    ParsedName {
        number: None,
        name: name.to_string(),
    }
}

/// File name for the `index`-th (1-based) shot of a capture run.
pub fn shot_file_name(index: usize, kind: &str) -> String {
    format!("{index:03}-{kind}.png")
}

/// Order two paths by numeric prefix, then by full file name.
///
/// Numbered files sort before unnumbered ones.
pub fn compare_numbered(a: &Path, b: &Path) -> Ordering {
    let parse = |p: &Path| {
        let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        parse_entry_name(stem).number
    };
    let by_number = match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_number.then_with(|| a.file_name().cmp(&b.file_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn numbered_with_kind() {
        let p = parse_entry_name("003-retake");
        assert_eq!(p.number, Some(3));
        assert_eq!(p.name, "retake");
    }

    #[test]
    fn number_only_no_dash() {
        let p = parse_entry_name("001");
        assert_eq!(p.number, Some(1));
        assert_eq!(p.name, "");
    }

    #[test]
    fn number_with_trailing_dash() {
        let p = parse_entry_name("001-");
        assert_eq!(p.number, Some(1));
        assert_eq!(p.name, "");
    }

    #[test]
    fn unnumbered_keeps_dashes() {
        let p = parse_entry_name("guest-selfie");
        assert_eq!(p.number, None);
        assert_eq!(p.name, "guest-selfie");
    }

    #[test]
    fn shot_names_are_zero_padded() {
        assert_eq!(shot_file_name(1, "original"), "001-original.png");
        assert_eq!(shot_file_name(12, "retake"), "012-retake.png");
    }

    #[test]
    fn numeric_order_beats_lexical() {
        let mut paths: Vec<PathBuf> = ["10-b.jpg", "zz.jpg", "2-c.jpg", "002-a.jpg", "aa.png"]
            .iter()
            .map(PathBuf::from)
            .collect();
        paths.sort_by(|a, b| compare_numbered(a, b));
        let names: Vec<_> = paths.iter().map(|p| p.to_str().unwrap()).collect();
        assert_eq!(names, ["002-a.jpg", "2-c.jpg", "10-b.jpg", "aa.png", "zz.jpg"]);
    }
}
