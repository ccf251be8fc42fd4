//! Camera access.
//!
//! This module provides:
//! - The hardware seam (`CameraBackend`, `MediaTrack`, `FrameSource`, `VideoSurface`)
//! - `MediaResourceGuard`, the single owner of the camera per screen
//! - `FrameSurface`, a headless surface
//! - Backends: synthetic (`stub://` devices) and V4L2 (feature: camera-v4l2)
//!
//! Nothing outside this module touches camera hardware directly. Still capture
//! and barcode scanning both go through the guard.

mod backend;
mod guard;
#[cfg(feature = "camera-v4l2")]
mod normalize;
mod surface;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use anyhow::Result;

pub use backend::{
    CameraBackend, Facing, FrameSource, MediaStream, MediaTrack, StreamRequest,
    VideoSurface,
};
pub use guard::{Binding, MediaResourceGuard, MediaSession, StreamOrigin};
pub use surface::FrameSurface;
pub use synthetic::{SyntheticCamera, SyntheticControl};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

use crate::config::CameraSettings;

/// Build the backend for the configured device.
///
/// `stub://` devices get the synthetic camera; anything else is a V4L2 path.
pub fn open_backend(settings: &CameraSettings) -> Result<Box<dyn CameraBackend>> {
    if settings.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(&settings.device)));
    }
    open_device_backend(settings)
}

#[cfg(feature = "camera-v4l2")]
fn open_device_backend(settings: &CameraSettings) -> Result<Box<dyn CameraBackend>> {
    Ok(Box::new(V4l2Camera::new(settings.clone())))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_device_backend(settings: &CameraSettings) -> Result<Box<dyn CameraBackend>> {
    Err(anyhow::anyhow!(
        "camera device '{}' requires the camera-v4l2 feature; use a stub:// device otherwise",
        settings.device
    ))
}
