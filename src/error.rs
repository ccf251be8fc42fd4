//! Error taxonomy for the capture and scan pipeline.
//!
//! `CameraError` is what the pipeline surfaces to callers and observers.
//! `BackendError` is what a camera backend reports when a stream request fails;
//! the guard folds those into `CameraError::NoCamera` after the fallback.

use thiserror::Error;

use crate::sinks::Severity;

/// Failure reported by a camera backend for a single stream request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no matching camera device: {0}")]
    NotFound(String),
    #[error("camera cannot satisfy requested constraints: {0}")]
    ConstraintMismatch(String),
    #[error("camera device error: {0}")]
    Device(String),
}

/// Terminal (or, for `NotReady`, recoverable) failures of the pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CameraError {
    /// Both the environment-facing request and the unconstrained fallback failed.
    #[error("no camera available: {cause}")]
    NoCamera { cause: String },
    /// The surface had no decoded frame, even after the single retry.
    #[error("camera not ready: {reason}")]
    NotReady { reason: String },
    /// Rendering or encoding the still frame failed.
    #[error("capture failed: {0}")]
    Capture(String),
    /// The decode engine could not start against the bound surface.
    #[error("decode engine failed to start: {0}")]
    DecodeEngineInit(String),
}

impl CameraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::NoCamera { .. } => ErrorKind::NoCameraAvailable,
            CameraError::NotReady { .. } => ErrorKind::CameraNotReady,
            CameraError::Capture(_) => ErrorKind::CaptureError,
            CameraError::DecodeEngineInit(_) => ErrorKind::DecodeEngineInitFailed,
        }
    }

    /// Only `NotReady` can be retried without a reset.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CameraError::NotReady { .. })
    }
}

/// Flat error kind passed to `ScanObserver::on_error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoCameraAvailable,
    CameraNotReady,
    CaptureError,
    DecodeEngineInitFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoCameraAvailable => "no_camera_available",
            ErrorKind::CameraNotReady => "camera_not_ready",
            ErrorKind::CaptureError => "capture_error",
            ErrorKind::DecodeEngineInitFailed => "decode_engine_init_failed",
        }
    }

    /// User-facing notice (title, description, severity) for this kind.
    pub fn notice(&self) -> (&'static str, &'static str, Severity) {
        match self {
            ErrorKind::NoCameraAvailable => (
                "Camera unavailable",
                "Allow camera access for this app, or connect a camera, then tap Retry.",
                Severity::Error,
            ),
            ErrorKind::CameraNotReady => (
                "Camera is still starting",
                "The picture is not ready yet. Hold steady and tap Capture again.",
                Severity::Warning,
            ),
            ErrorKind::CaptureError => (
                "Could not take photo",
                "Something went wrong while saving the picture. Tap Retry to try again.",
                Severity::Error,
            ),
            ErrorKind::DecodeEngineInitFailed => (
                "Scanner could not start",
                "The barcode scanner failed to start. Tap Retry, or enter the product manually.",
                Severity::Error,
            ),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
