/// Data model — chip identities, operation requests, and formatting helpers.
pub mod chip;
pub mod request;
pub mod size;

pub use chip::{BoardDetection, ChipFamily, ChipReading};
pub use request::{
    BackupRequest, FlashRequest, DEFAULT_BACKUP_SIZE, DEFAULT_FLASH_ADDRESS, DEFAULT_FLASH_BAUD,
};
pub use size::format_size;
