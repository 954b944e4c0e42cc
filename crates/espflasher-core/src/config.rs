/// Backend configuration — explicit, constructed by the caller, and passed
/// into each operation. No operation holds a reference to wider application
/// state.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Default hard bound on a single port probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// The flashing backend invocation.
///
/// Any executable honoring esptool's line-oriented contract works: progress
/// lines with an embedded `(NN %)` marker, exit code 0 on success, and the
/// `"Chip is"` / `"MAC:"` / `"Detected flash size:"` markers in `flash_id`
/// output. The integration tests substitute shell scripts through this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsptoolConfig {
    /// Backend executable name or path.
    pub program: PathBuf,
    /// Hard per-port bound for `flash_id` probes. The probe process is
    /// terminated, not abandoned, when it expires.
    pub probe_timeout: Duration,
}

impl Default for EsptoolConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("esptool"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl EsptoolConfig {
    /// Config for a specific backend executable, with default timeouts.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Find a working backend on PATH by probing the usual names with the
    /// `version` subcommand.
    pub fn locate() -> Option<PathBuf> {
        for candidate in ["esptool", "esptool.py"] {
            let found = Command::new(candidate)
                .arg("version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            if found {
                return Some(PathBuf::from(candidate));
            }
        }
        None
    }
}
