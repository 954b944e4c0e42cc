/// Line scanner for `flash_id` probe output.
///
/// Classification takes the first matching line per category and never
/// merges conflicting lines: once a chip family, MAC, or flash size has
/// been read, later lines cannot overwrite it.
use crate::model::ChipFamily;

/// Chip markers in most-specific-first order, so a line containing
/// "ESP32-S3" never reads as plain ESP32.
const CHIP_MARKERS: &[(&str, ChipFamily)] = &[
    ("ESP32-S2", ChipFamily::Esp32S2),
    ("ESP32-S3", ChipFamily::Esp32S3),
    ("ESP32-C3", ChipFamily::Esp32C3),
    ("ESP32-C6", ChipFamily::Esp32C6),
    ("ESP32-H2", ChipFamily::Esp32H2),
    ("ESP32", ChipFamily::Esp32),
    ("ESP8266", ChipFamily::Esp8266),
];

/// What a pass over the probe output found.
#[derive(Debug, Default)]
pub(crate) struct ProbeScan {
    pub chip: Option<ChipFamily>,
    pub mac: Option<String>,
    pub flash_size: Option<String>,
}

/// Scan probe output lines in document order.
pub(crate) fn scan_output<'a>(lines: impl IntoIterator<Item = &'a str>) -> ProbeScan {
    let mut scan = ProbeScan::default();
    for line in lines {
        if line.contains("Chip is") || line.contains("Detecting chip type") {
            if scan.chip.is_none() {
                scan.chip = chip_from_line(line);
            }
        } else if line.contains("MAC:") {
            if scan.mac.is_none() {
                scan.mac = tail_after(line, "MAC:");
            }
        } else if line.contains("Detected flash size:") && scan.flash_size.is_none() {
            scan.flash_size = tail_after(line, "Detected flash size:");
        }
    }
    scan
}

fn chip_from_line(line: &str) -> Option<ChipFamily> {
    let upper = line.to_ascii_uppercase();
    CHIP_MARKERS
        .iter()
        .find(|(marker, _)| upper.contains(marker))
        .map(|(_, family)| *family)
}

/// Trimmed text after the last occurrence of `marker`, if non-empty.
fn tail_after(line: &str, marker: &str) -> Option<String> {
    let tail = line.rsplit(marker).next()?.trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_family_beats_generic() {
        assert_eq!(
            chip_from_line("Chip is ESP32-S3 (QFN56) (revision v0.2)"),
            Some(ChipFamily::Esp32S3)
        );
        assert_eq!(
            chip_from_line("Detecting chip type... ESP32-C6"),
            Some(ChipFamily::Esp32C6)
        );
        assert_eq!(chip_from_line("Chip is ESP32-D0WD-V3"), Some(ChipFamily::Esp32));
        assert_eq!(chip_from_line("Chip is ESP8266EX"), Some(ChipFamily::Esp8266));
    }

    #[test]
    fn test_case_insensitive_markers() {
        assert_eq!(chip_from_line("Chip is esp32-c3"), Some(ChipFamily::Esp32C3));
    }

    #[test]
    fn test_first_matching_line_wins() {
        let scan = scan_output([
            "Chip is ESP32-S2FNR2",
            "Chip is ESP32-S3 (later line must not overwrite)",
            "MAC: aa:bb:cc:dd:ee:ff",
            "MAC: 11:22:33:44:55:66",
        ]);
        assert_eq!(scan.chip, Some(ChipFamily::Esp32S2));
        assert_eq!(scan.mac.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_unrecognized_chip_line_keeps_scanning() {
        let scan = scan_output([
            "Detecting chip type... (unsupported)",
            "Chip is ESP32-H2",
        ]);
        assert_eq!(scan.chip, Some(ChipFamily::Esp32H2));
    }

    #[test]
    fn test_full_probe_output() {
        let scan = scan_output([
            "esptool.py v4.7.0",
            "Serial port /dev/ttyUSB0",
            "Connecting....",
            "Detecting chip type... ESP32",
            "Chip is ESP32-D0WD-V3 (revision v3.1)",
            "Features: WiFi, BT, Dual Core",
            "MAC: 7c:df:a1:00:11:22",
            "Detected flash size: 4MB",
            "Hard resetting via RTS pin...",
        ]);
        assert_eq!(scan.chip, Some(ChipFamily::Esp32));
        assert_eq!(scan.mac.as_deref(), Some("7c:df:a1:00:11:22"));
        assert_eq!(scan.flash_size.as_deref(), Some("4MB"));
    }

    #[test]
    fn test_empty_output() {
        let scan = scan_output([]);
        assert!(scan.chip.is_none());
        assert!(scan.mac.is_none());
        assert!(scan.flash_size.is_none());
    }
}
