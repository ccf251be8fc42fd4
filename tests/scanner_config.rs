use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use scan_kernel::config::ScannerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SCANNER_CONFIG",
        "SCANNER_DEVICE",
        "SCANNER_FALLBACK_DEVICE",
        "SCANNER_WIDTH",
        "SCANNER_HEIGHT",
        "SCANNER_CONFIRM_WINDOW",
        "SCANNER_CONFIRM_THRESHOLD",
        "SCANNER_RETRY_DELAY_MS",
        "SCANNER_MAX_DIMENSION",
        "SCANNER_SAMPLE_HZ",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": {
            "device": "/dev/video2",
            "fallback_device": "/dev/video0",
            "width": 1920,
            "height": 1080
        },
        "confirmation": { "window": 7, "threshold": 4 },
        "capture": { "retry_delay_ms": 350, "max_dimension": 800, "jpeg_quality": 90 },
        "decode": { "sample_hz": 15 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("SCANNER_CONFIG", file.path());
    std::env::set_var("SCANNER_DEVICE", "stub://bench");
    std::env::set_var("SCANNER_CONFIRM_THRESHOLD", "5");

    let cfg = ScannerConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!(cfg.camera.fallback_device.as_deref(), Some("/dev/video0"));
    assert_eq!(cfg.camera.width, 1920);
    assert_eq!(cfg.camera.height, 1080);
    assert_eq!(cfg.confirmation.window, 7);
    assert_eq!(cfg.confirmation.threshold, 5);
    assert_eq!(cfg.capture.retry_delay, Duration::from_millis(350));
    assert_eq!(cfg.capture.max_dimension, 800);
    assert_eq!(cfg.capture.jpeg_quality, 90);
    assert_eq!(cfg.decode.sample_hz, 15);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [camera]
        device = "stub://dock"

        [confirmation]
        window = 3
        threshold = 2
    "#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("SCANNER_CONFIG", file.path());

    let cfg = ScannerConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://dock");
    assert_eq!(cfg.confirmation.window, 3);
    assert_eq!(cfg.confirmation.threshold, 2);
    assert_eq!(cfg.capture.retry_delay, Duration::from_millis(200));

    clear_env();
}

#[test]
fn no_file_uses_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ScannerConfig::load().expect("load config");
    assert_eq!(cfg, ScannerConfig::default());
}

#[test]
fn rejects_threshold_above_window() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANNER_CONFIRM_WINDOW", "4");
    std::env::set_var("SCANNER_CONFIRM_THRESHOLD", "5");
    let err = ScannerConfig::load().expect_err("threshold > window");
    assert!(err.to_string().contains("confirmation.threshold"));

    clear_env();
}

#[test]
fn rejects_non_numeric_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCANNER_RETRY_DELAY_MS", "soon");
    let err = ScannerConfig::load().expect_err("bad number");
    assert!(err.to_string().contains("SCANNER_RETRY_DELAY_MS"));

    clear_env();
}

#[test]
fn malformed_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(b"{ \"camera\": ").expect("write config");
    let err = ScannerConfig::from_path(file.path()).expect_err("truncated json");
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
