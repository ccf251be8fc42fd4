//! Still capture.
//!
//! `StillCaptureController` grabs one frame from the guard's surface:
//! 1. Capture immediately when the surface has a decoded frame
//! 2. Otherwise schedule exactly one retry after `retry_delay`
//! 3. Downscale to `max_dimension`, encode JPEG, return a data URI
//!
//! A successful capture releases the camera: still capture is one-shot per
//! activation. Only one attempt may be in flight at a time; repeated requests
//! while one is pending are suppressed, not queued.

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use std::time::Instant;

use crate::camera::{Binding, MediaResourceGuard};
use crate::config::CaptureSettings;
use crate::error::CameraError;
use crate::frame::VideoFrame;
use crate::sinks::Hooks;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// One captured still. Immutable; the next capture supersedes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedImage {
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

impl CapturedImage {
    /// Decode the JPEG payload back out of the data URI.
    pub fn jpeg_bytes(&self) -> Result<Vec<u8>, CameraError> {
        let payload = self
            .data_uri
            .strip_prefix(DATA_URI_PREFIX)
            .ok_or_else(|| CameraError::Capture("not a JPEG data URI".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|err| CameraError::Capture(format!("corrupt data URI payload: {}", err)))
    }
}

/// Result of a capture request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(CapturedImage),
    /// Surface not ready; one retry is due at the given instant. Call `poll`.
    RetryScheduled { at: Instant },
    /// Another attempt is already in flight.
    Suppressed,
}

/// Single-flight still capture through the shared guard.
#[derive(Debug)]
pub struct StillCaptureController {
    settings: CaptureSettings,
    in_flight: bool,
    retry_at: Option<Instant>,
    hooks: Hooks,
}

impl StillCaptureController {
    pub fn new(settings: CaptureSettings, hooks: Hooks) -> Self {
        Self {
            settings,
            in_flight: false,
            retry_at: None,
            hooks,
        }
    }

    /// Turn the camera on for a capture.
    ///
    /// On failure the guard holds nothing and `on_error` has fired.
    pub fn activate(&mut self, guard: &mut MediaResourceGuard) -> Result<Binding, CameraError> {
        self.cancel();
        match guard.acquire() {
            Ok(binding) => Ok(binding),
            Err(err) => {
                guard.release();
                self.hooks.report_error(&err);
                Err(err)
            }
        }
    }

    /// Request a capture at `now`.
    pub fn capture(
        &mut self,
        guard: &mut MediaResourceGuard,
        now: Instant,
    ) -> Result<CaptureOutcome, CameraError> {
        if self.in_flight {
            log::debug!("StillCaptureController: capture already in flight; suppressed");
            return Ok(CaptureOutcome::Suppressed);
        }
        if !guard.is_active() {
            let err = CameraError::NotReady {
                reason: "camera is not active".into(),
            };
            self.hooks.report_error(&err);
            return Err(err);
        }

        self.in_flight = true;
        if surface_has_frame(guard) {
            return self.finish(guard).map(CaptureOutcome::Captured);
        }

        let at = now + self.settings.retry_delay;
        log::debug!(
            "StillCaptureController: surface not ready; retrying in {:?}",
            self.settings.retry_delay
        );
        self.retry_at = Some(at);
        Ok(CaptureOutcome::RetryScheduled { at })
    }

    /// Fire the scheduled retry once it is due.
    ///
    /// Returns `Ok(None)` when no retry is due.
    pub fn poll(
        &mut self,
        guard: &mut MediaResourceGuard,
        now: Instant,
    ) -> Result<Option<CapturedImage>, CameraError> {
        match self.retry_at {
            Some(at) if now >= at => {}
            _ => return Ok(None),
        }
        self.retry_at = None;

        if guard.is_active() && surface_has_frame(guard) {
            return self.finish(guard).map(Some);
        }

        // Recoverable: the camera stays live so the user can capture again.
        self.in_flight = false;
        let err = CameraError::NotReady {
            reason: format!(
                "no video frame after waiting {:?}",
                self.settings.retry_delay
            ),
        };
        self.hooks.report_error(&err);
        Err(err)
    }

    /// Capture, sleeping through the retry delay when needed.
    pub fn capture_blocking(
        &mut self,
        guard: &mut MediaResourceGuard,
    ) -> Result<CapturedImage, CameraError> {
        match self.capture(guard, Instant::now())? {
            CaptureOutcome::Captured(image) => Ok(image),
            CaptureOutcome::RetryScheduled { at } => {
                std::thread::sleep(at.saturating_duration_since(Instant::now()));
                self.poll(guard, at.max(Instant::now()))?
                    .ok_or_else(|| CameraError::NotReady {
                        reason: "retry did not run".into(),
                    })
            }
            CaptureOutcome::Suppressed => Err(CameraError::NotReady {
                reason: "a capture is already in progress".into(),
            }),
        }
    }

    /// Drop any pending attempt. The camera is left to the caller.
    pub fn cancel(&mut self) {
        if self.in_flight {
            log::debug!("StillCaptureController: pending capture cancelled");
        }
        self.in_flight = false;
        self.retry_at = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn retry_due_at(&self) -> Option<Instant> {
        self.retry_at
    }

    fn finish(&mut self, guard: &mut MediaResourceGuard) -> Result<CapturedImage, CameraError> {
        let rendered = guard
            .surface()
            .render_frame()
            .map_err(|err| CameraError::Capture(format!("no drawable frame: {}", err)))
            .and_then(|frame| encode_still(frame, &self.settings));

        // One-shot: the camera goes off whatever the encode outcome.
        guard.release();
        self.in_flight = false;

        match rendered {
            Ok(image) => {
                log::info!(
                    "StillCaptureController: captured {}x{} ({} bytes)",
                    image.width,
                    image.height,
                    image.data_uri.len()
                );
                self.hooks.record(
                    "capture.completed",
                    &[
                        ("width", image.width.to_string()),
                        ("height", image.height.to_string()),
                    ],
                );
                self.hooks.observer().on_capture_complete(&image);
                Ok(image)
            }
            Err(err) => {
                self.hooks.report_error(&err);
                Err(err)
            }
        }
    }
}

fn surface_has_frame(guard: &MediaResourceGuard) -> bool {
    let surface = guard.surface();
    let (width, height) = surface.dimensions();
    surface.ready_state().has_enough_data() && width > 0 && height > 0
}

/// Output dimensions preserving aspect ratio with both sides `<= max_dimension`.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }
    let scale = f64::min(
        max_dimension as f64 / width as f64,
        max_dimension as f64 / height as f64,
    );
    let scaled = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max_dimension);
    (scaled(width), scaled(height))
}

/// Render a frame to an off-screen bitmap and encode it as a JPEG data URI.
pub fn encode_still(frame: VideoFrame, settings: &CaptureSettings) -> Result<CapturedImage, CameraError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 {
        return Err(CameraError::Capture("frame has zero dimensions".into()));
    }
    let bitmap = RgbaImage::from_raw(width, height, frame.rgba).ok_or_else(|| {
        CameraError::Capture(format!(
            "frame buffer does not match {}x{} RGBA",
            width, height
        ))
    })?;

    let (out_width, out_height) = bounded_dimensions(width, height, settings.max_dimension);
    let bitmap = if (out_width, out_height) == (width, height) {
        bitmap
    } else {
        image::imageops::resize(&bitmap, out_width, out_height, FilterType::Triangle)
    };
    let rgb = DynamicImage::ImageRgba8(bitmap).to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, settings.jpeg_quality)
        .encode_image(&rgb)
        .map_err(|err| CameraError::Capture(format!("jpeg encode failed: {}", err)))?;

    let mut data_uri = String::with_capacity(DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    data_uri.push_str(DATA_URI_PREFIX);
    base64::engine::general_purpose::STANDARD.encode_string(&jpeg, &mut data_uri);

    Ok(CapturedImage {
        data_uri,
        width: out_width,
        height: out_height,
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
