/// Boundary parsing for the flashing backend's human-readable output.
///
/// The backend's text format is the actual contract: a `(NN %)` marker
/// embedded in write/read progress lines, and fixed marker substrings in
/// `flash_id` output (scanned in [`crate::probe`]). Nothing here attempts
/// to extract structured error causes — failures surface the raw log.
use regex::Regex;
use std::sync::OnceLock;

/// Matches the percentage marker, e.g. `Writing at 0x00010000... (42 %)`.
/// Both `(42 %)` and `(42%)` forms appear depending on the backend version.
fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d+)\s*%\)").expect("static regex is well-formed"))
}

/// Extract a percentage marker from an output line, clamped to 100.
pub(crate) fn percent_marker(line: &str) -> Option<u8> {
    let caps = percent_re().captures(line)?;
    let value: u32 = caps[1].parse().ok()?;
    Some(value.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_with_space() {
        assert_eq!(percent_marker("Writing at 0x00010000... (42 %)"), Some(42));
    }

    #[test]
    fn test_percent_without_space() {
        assert_eq!(percent_marker("Writing at 0x00001000... (100%)"), Some(100));
    }

    #[test]
    fn test_percent_absent() {
        assert_eq!(percent_marker("Connecting...."), None);
        assert_eq!(percent_marker("Wrote 4096 bytes"), None);
    }

    #[test]
    fn test_percent_overflow_clamped() {
        assert_eq!(percent_marker("(250 %)"), Some(100));
        // Values wider than u32 still never panic, just fail to parse.
        assert_eq!(percent_marker("(99999999999999999999 %)"), None);
    }

    #[test]
    fn test_percent_first_marker_wins() {
        assert_eq!(percent_marker("(10 %) then (20 %)"), Some(10));
    }
}
