/// Operation requests — explicit parameter structs constructed by the
/// caller and validated before any OS resource is acquired. Operations
/// never reach back into shared application state for settings.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::ValidationError;
use crate::model::ChipFamily;

/// Default baud rate for flash and backup transfers.
pub const DEFAULT_FLASH_BAUD: u32 = 460_800;

/// Default flash offset.
pub const DEFAULT_FLASH_ADDRESS: &str = "0x0";

/// Default backup capacity: 4 MiB, the most common ESP32 flash size.
pub const DEFAULT_BACKUP_SIZE: u64 = 4 * 1024 * 1024;

/// Parameters for one firmware flash run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashRequest {
    /// Target family; `None` lets the backend auto-detect (`--chip auto`).
    pub chip: Option<ChipFamily>,
    pub port: String,
    pub baud: u32,
    pub firmware: PathBuf,
    /// Flash offset as a hex literal, e.g. "0x0" or "0x10000".
    pub address: String,
    /// Run a full chip erase (its own supervised process) before writing.
    pub erase_first: bool,
    /// Ask the backend to verify the written image.
    pub verify: bool,
    /// OTA parameter set: fixed flash mode with size detection, for targets
    /// that do not support auto-detection during normal serial flashing.
    pub ota_mode: bool,
}

impl FlashRequest {
    /// A request with the default baud and address and no optional steps.
    pub fn new(port: impl Into<String>, firmware: impl Into<PathBuf>) -> Self {
        Self {
            chip: None,
            port: port.into(),
            baud: DEFAULT_FLASH_BAUD,
            firmware: firmware.into(),
            address: DEFAULT_FLASH_ADDRESS.to_string(),
            erase_first: false,
            verify: false,
            ota_mode: false,
        }
    }

    /// The `--chip` argument value for this request.
    pub fn chip_arg(&self) -> &'static str {
        self.chip.map(ChipFamily::flash_arg).unwrap_or("auto")
    }

    /// Check the request before spawning anything: the firmware file must
    /// exist and be readable, the port non-empty, the address a hex literal.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port.trim().is_empty() {
            return Err(ValidationError::EmptyPort);
        }
        if !self.firmware.is_file() {
            return Err(ValidationError::FirmwareNotFound(self.firmware.clone()));
        }
        fs::File::open(&self.firmware).map_err(|source| ValidationError::FirmwareUnreadable {
            path: self.firmware.clone(),
            source,
        })?;
        parse_hex_address(&self.address)?;
        Ok(())
    }

    /// Byte size of the firmware image, for throughput estimation.
    pub fn firmware_size(&self) -> io::Result<u64> {
        fs::metadata(&self.firmware).map(|meta| meta.len())
    }
}

/// Parameters for one flash-image backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRequest {
    /// Family label used for the `--chip` argument and the output filename;
    /// `None` means auto.
    pub chip: Option<ChipFamily>,
    pub port: String,
    pub baud: u32,
    /// Bytes to read, starting at offset 0.
    pub size_bytes: u64,
    /// Directory the timestamped backup file is created in.
    pub output_dir: PathBuf,
}

impl BackupRequest {
    pub fn new(port: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            chip: None,
            port: port.into(),
            baud: DEFAULT_FLASH_BAUD,
            size_bytes: DEFAULT_BACKUP_SIZE,
            output_dir: output_dir.into(),
        }
    }

    pub fn chip_arg(&self) -> &'static str {
        self.chip.map(ChipFamily::flash_arg).unwrap_or("auto")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port.trim().is_empty() {
            return Err(ValidationError::EmptyPort);
        }
        if self.size_bytes == 0 {
            return Err(ValidationError::ZeroBackupSize);
        }
        Ok(())
    }
}

/// Parse a `0x`-prefixed hex literal flash offset.
pub fn parse_hex_address(address: &str) -> Result<u32, ValidationError> {
    let trimmed = address.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| ValidationError::InvalidAddress(address.to_string()))?;
    u32::from_str_radix(digits, 16).map_err(|_| ValidationError::InvalidAddress(address.to_string()))
}
