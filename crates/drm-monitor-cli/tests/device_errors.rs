use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_missing_device_fails_naming_open() {
    let dir = tempdir().unwrap();
    let device = dir.path().join("card-missing");

    cargo_bin_cmd!("drm_monitor")
        .env_remove("DRM_MONITOR_DEVICE")
        .arg("-d")
        .arg(&device)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("open"))
        .stderr(predicate::str::contains("card-missing"));
}

#[test]
fn test_device_from_environment() {
    let dir = tempdir().unwrap();
    let device = dir.path().join("env-card");

    cargo_bin_cmd!("drm_monitor")
        .env("DRM_MONITOR_DEVICE", &device)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("env-card"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_drm_device_fails_enumeration() {
    cargo_bin_cmd!("drm_monitor")
        .args(["-d", "/dev/null"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("enumerate CRTCs failed"));
}

#[test]
fn test_log_file_is_created() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("monitor.log");

    cargo_bin_cmd!("drm_monitor")
        .env("DRM_MONITOR_LOG", "info")
        .arg("--log-file")
        .arg(&log)
        .arg("-d")
        .arg(dir.path().join("no-such-card"))
        .assert()
        .code(1);

    assert!(log.exists());
}
