use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::confirm::MAX_WINDOW;

const DEFAULT_DEVICE: &str = "stub://rear_camera";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_CONFIRM_WINDOW: usize = 5;
const DEFAULT_CONFIRM_THRESHOLD: usize = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 200;
const DEFAULT_MAX_DIMENSION: u32 = 1024;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_SAMPLE_HZ: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct ScannerConfigFile {
    camera: Option<CameraConfigFile>,
    confirmation: Option<ConfirmationConfigFile>,
    capture: Option<CaptureConfigFile>,
    decode: Option<DecodeConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    fallback_device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfirmationConfigFile {
    window: Option<usize>,
    threshold: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    retry_delay_ms: Option<u64>,
    max_dimension: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct DecodeConfigFile {
    sample_hz: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerConfig {
    pub camera: CameraSettings,
    pub confirmation: ConfirmationSettings,
    pub capture: CaptureSettings,
    pub decode: DecodeSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    /// Device for the environment-facing request (`stub://...` or a V4L2 path).
    pub device: String,
    /// Device for the unconstrained fallback request; defaults to `device`.
    pub fallback_device: Option<String>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationSettings {
    pub window: usize,
    pub threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub retry_delay: Duration,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSettings {
    pub sample_hz: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            fallback_device: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            window: DEFAULT_CONFIRM_WINDOW,
            threshold: DEFAULT_CONFIRM_THRESHOLD,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            sample_hz: DEFAULT_SAMPLE_HZ,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::from_file(ScannerConfigFile::default())
    }
}

impl ScannerConfig {
    /// Load from `$SCANNER_CONFIG` (JSON, or TOML for `.toml` paths), then
    /// apply `SCANNER_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCANNER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScannerConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let confirmation = file.confirmation.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let decode = file.decode.unwrap_or_default();
        Self {
            camera: CameraSettings {
                device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
                fallback_device: camera.fallback_device,
                width: camera.width.unwrap_or(DEFAULT_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_HEIGHT),
            },
            confirmation: ConfirmationSettings {
                window: confirmation.window.unwrap_or(DEFAULT_CONFIRM_WINDOW),
                threshold: confirmation.threshold.unwrap_or(DEFAULT_CONFIRM_THRESHOLD),
            },
            capture: CaptureSettings {
                retry_delay: Duration::from_millis(
                    capture.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
                max_dimension: capture.max_dimension.unwrap_or(DEFAULT_MAX_DIMENSION),
                jpeg_quality: capture.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            decode: DecodeSettings {
                sample_hz: decode.sample_hz.unwrap_or(DEFAULT_SAMPLE_HZ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("SCANNER_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(device) = std::env::var("SCANNER_FALLBACK_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.fallback_device = Some(device);
            }
        }
        if let Some(width) = env_number("SCANNER_WIDTH")? {
            self.camera.width = width;
        }
        if let Some(height) = env_number("SCANNER_HEIGHT")? {
            self.camera.height = height;
        }
        if let Some(window) = env_number("SCANNER_CONFIRM_WINDOW")? {
            self.confirmation.window = window;
        }
        if let Some(threshold) = env_number("SCANNER_CONFIRM_THRESHOLD")? {
            self.confirmation.threshold = threshold;
        }
        if let Some(delay_ms) = env_number::<u64>("SCANNER_RETRY_DELAY_MS")? {
            self.capture.retry_delay = Duration::from_millis(delay_ms);
        }
        if let Some(max_dimension) = env_number("SCANNER_MAX_DIMENSION")? {
            self.capture.max_dimension = max_dimension;
        }
        if let Some(sample_hz) = env_number("SCANNER_SAMPLE_HZ")? {
            self.decode.sample_hz = sample_hz;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera.device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        let window = self.confirmation.window;
        let threshold = self.confirmation.threshold;
        if window == 0 || window > MAX_WINDOW {
            return Err(anyhow!(
                "confirmation.window must be between 1 and {}",
                MAX_WINDOW
            ));
        }
        if threshold == 0 || threshold > window {
            return Err(anyhow!(
                "confirmation.threshold must be between 1 and the window size ({})",
                window
            ));
        }
        if self.capture.max_dimension == 0 {
            return Err(anyhow!("capture.max_dimension must be greater than zero"));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(anyhow!("capture.jpeg_quality must be between 1 and 100"));
        }
        if self.decode.sample_hz == 0 || self.decode.sample_hz > 1000 {
            return Err(anyhow!("decode.sample_hz must be between 1 and 1000"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ScannerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}
