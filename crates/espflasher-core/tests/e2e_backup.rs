#![cfg(unix)]
//! End-to-end backup tests: artifact creation and naming, the
//! partial-file-on-failure policy, and validation before launch.

mod common;

use common::{drain_to_outcome, init_tracing, write_fake_tool};
use espflasher_core::backup::{list_backups, start_backup};
use espflasher_core::config::EsptoolConfig;
use espflasher_core::events::OperationOutcome;
use espflasher_core::model::BackupRequest;
use tempfile::TempDir;

/// Script that resolves its last argument (the output file) and writes
/// `bytes` zeroes into it before exiting with `exit_code`.
fn read_flash_script(bytes: usize, exit_code: i32) -> String {
    format!(
        "for arg in \"$@\"; do out=\"$arg\"; done\n\
         echo \"Reading {bytes} bytes... (50 %)\"\n\
         echo \"Reading {bytes} bytes... (100 %)\"\n\
         head -c {bytes} /dev/zero > \"$out\"\n\
         exit {exit_code}\n"
    )
}

#[test]
fn backup_writes_artifact_and_reports_path() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let output_dir = tmp.path().join("backups");
    let tool = write_fake_tool(tmp.path(), &read_flash_script(4096, 0));

    let mut request = BackupRequest::new("/dev/ttyFAKE0", &output_dir);
    request.size_bytes = 4096;
    let handle = start_backup(EsptoolConfig::with_program(&tool), request);
    let (progress, outcome) = drain_to_outcome(&handle);

    assert!(outcome.is_success(), "expected success, got {outcome:?}");
    let artifact = outcome.artifact().expect("success carries the file path");
    assert!(artifact.exists());
    assert_eq!(std::fs::metadata(artifact).unwrap().len(), 4096);

    let name = artifact.file_name().unwrap().to_string_lossy();
    assert!(
        name.starts_with("backup_auto_dev_ttyFAKE0_"),
        "chip and sanitized port must be embedded: {name}"
    );
    assert!(name.ends_with(".bin"));

    let percents: Vec<u8> = progress.iter().map(|p| p.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*percents.last().unwrap(), 100);

    // The new artifact shows up in the inventory.
    let inventory = list_backups(&output_dir);
    assert_eq!(inventory.len(), 1);
    assert_eq!(inventory[0].size_bytes, 4096);
}

/// On failure the partially-written file stays on disk; cleanup (or a
/// temp-and-rename scheme) is the caller's decision.
#[test]
fn failed_backup_leaves_partial_file() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let output_dir = tmp.path().join("backups");
    let tool = write_fake_tool(tmp.path(), &read_flash_script(16, 1));

    let mut request = BackupRequest::new("/dev/ttyFAKE0", &output_dir);
    request.size_bytes = 4096;
    let handle = start_backup(EsptoolConfig::with_program(&tool), request);
    let (_, outcome) = drain_to_outcome(&handle);

    assert!(matches!(outcome, OperationOutcome::Failed { .. }));
    let leftovers = list_backups(&output_dir);
    assert_eq!(leftovers.len(), 1, "the partial file is not cleaned up");
    assert_eq!(leftovers[0].size_bytes, 16);
}

#[test]
fn invalid_backup_request_never_launches() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("invoked");
    let tool = write_fake_tool(
        tmp.path(),
        &format!("touch {}\nexit 0\n", marker.display()),
    );

    let mut request = BackupRequest::new("/dev/ttyFAKE0", tmp.path().join("backups"));
    request.size_bytes = 0;
    let handle = start_backup(EsptoolConfig::with_program(&tool), request);
    let (_, outcome) = drain_to_outcome(&handle);

    assert!(matches!(outcome, OperationOutcome::Failed { .. }));
    assert!(!marker.exists());
}
