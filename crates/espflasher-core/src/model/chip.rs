/// Chip identification — the ESP families the probe can recognize, the
/// outcome of a detection attempt, and the per-port detection record.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ports::PortDescriptor;

/// An ESP chip family the detection scanner can identify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChipFamily {
    Esp8266,
    Esp32,
    Esp32S2,
    Esp32S3,
    Esp32C3,
    Esp32C6,
    Esp32H2,
}

impl ChipFamily {
    /// The value the flashing backend expects after `--chip`.
    pub fn flash_arg(self) -> &'static str {
        match self {
            Self::Esp8266 => "esp8266",
            Self::Esp32 => "esp32",
            Self::Esp32S2 => "esp32s2",
            Self::Esp32S3 => "esp32s3",
            Self::Esp32C3 => "esp32c3",
            Self::Esp32C6 => "esp32c6",
            Self::Esp32H2 => "esp32h2",
        }
    }

    /// Marketing name, as the backend prints it ("Chip is ESP32-S3 ...").
    pub fn label(self) -> &'static str {
        match self {
            Self::Esp8266 => "ESP8266",
            Self::Esp32 => "ESP32",
            Self::Esp32S2 => "ESP32-S2",
            Self::Esp32S3 => "ESP32-S3",
            Self::Esp32C3 => "ESP32-C3",
            Self::Esp32C6 => "ESP32-C6",
            Self::Esp32H2 => "ESP32-H2",
        }
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a probe concluded about the chip on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChipReading {
    /// A known family was identified from the probe output.
    Identified(ChipFamily),
    /// The probe succeeded but no known family marker appeared.
    Unknown,
    /// The probe process exited non-zero (not an ESP, or not responding).
    Failed,
    /// The probe exceeded its hard timeout and was terminated.
    TimedOut,
}

impl ChipReading {
    pub fn is_esp(&self) -> bool {
        matches!(self, Self::Identified(_))
    }

    pub fn family(&self) -> Option<ChipFamily> {
        match self {
            Self::Identified(family) => Some(*family),
            _ => None,
        }
    }
}

impl fmt::Display for ChipReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identified(family) => family.fmt(f),
            Self::Unknown => f.write_str("Unknown"),
            Self::Failed => f.write_str("Not ESP / Detection failed"),
            Self::TimedOut => f.write_str("Detection timeout"),
        }
    }
}

/// Result of probing one serial port. Immutable once produced; downstream
/// flash/backup requests may use it as a default parameter source, but the
/// user can always override the chip type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardDetection {
    /// OS device identifier of the probed port.
    pub port: String,
    /// Human-readable port description, as enumerated.
    pub description: String,
    pub chip: ChipReading,
    /// MAC address reported by the probe, when one was printed.
    pub mac: Option<String>,
    /// Flash size reported by the probe, e.g. "4MB".
    pub flash_size: Option<String>,
}

impl BoardDetection {
    /// A detection record with no chip details, for failed or timed-out
    /// probes.
    pub(crate) fn without_details(port: &PortDescriptor, chip: ChipReading) -> Self {
        Self {
            port: port.device.clone(),
            description: port.description.clone(),
            chip,
            mac: None,
            flash_size: None,
        }
    }

    /// MAC address for display, "N/A" when the probe reported none.
    pub fn mac_display(&self) -> &str {
        self.mac.as_deref().unwrap_or("N/A")
    }

    /// Flash size for display, "N/A" when the probe reported none.
    pub fn flash_size_display(&self) -> &str {
        self.flash_size.as_deref().unwrap_or("N/A")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_arg_names() {
        assert_eq!(ChipFamily::Esp8266.flash_arg(), "esp8266");
        assert_eq!(ChipFamily::Esp32S3.flash_arg(), "esp32s3");
        assert_eq!(ChipFamily::Esp32H2.flash_arg(), "esp32h2");
    }

    #[test]
    fn test_reading_display() {
        assert_eq!(
            ChipReading::Identified(ChipFamily::Esp32C3).to_string(),
            "ESP32-C3"
        );
        assert_eq!(ChipReading::Failed.to_string(), "Not ESP / Detection failed");
        assert_eq!(ChipReading::TimedOut.to_string(), "Detection timeout");
    }

    #[test]
    fn test_detail_display_defaults() {
        let port = PortDescriptor {
            device: "/dev/ttyUSB0".into(),
            description: "CP2102".into(),
        };
        let detection = BoardDetection::without_details(&port, ChipReading::Failed);
        assert_eq!(detection.mac_display(), "N/A");
        assert_eq!(detection.flash_size_display(), "N/A");
        assert!(!detection.chip.is_esp());
    }
}
