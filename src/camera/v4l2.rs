//! V4L2 camera backend.
//!
//! Maps stream requests onto local V4L2 device nodes:
//! - Environment-facing requests open `camera.device` and insist on the
//!   configured resolution; a refused format is a constraint mismatch.
//! - Unconstrained requests open `camera.fallback_device` (or `camera.device`)
//!   and accept whatever format the driver reports.
//!
//! Frames stay in-memory and are converted to RGBA on read.

use ouroboros::self_referencing;
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{
    CameraBackend, FrameSource, MediaStream, MediaTrack, StreamRequest,
};
use super::normalize::{normalize_to_rgba, PixelFormat};
use crate::config::CameraSettings;
use crate::error::BackendError;
use crate::frame::{ReadyState, VideoFrame};

const MMAP_BUFFERS: u32 = 4;

/// Camera backend for local V4L2 devices.
pub struct V4l2Camera {
    settings: CameraSettings,
}

impl V4l2Camera {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }
}

impl CameraBackend for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open(&mut self, request: &StreamRequest) -> Result<MediaStream, BackendError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let strict = !request.is_unconstrained();
        let path = if strict {
            self.settings.device.clone()
        } else {
            self.settings
                .fallback_device
                .clone()
                .unwrap_or_else(|| self.settings.device.clone())
        };

        let mut device = v4l::Device::with_path(&path).map_err(|err| map_open_error(&path, err))?;
        let mut format = device
            .format()
            .map_err(|err| BackendError::Device(format!("read format of {}: {}", path, err)))?;
        if strict {
            format.width = request.width.unwrap_or(self.settings.width);
            format.height = request.height.unwrap_or(self.settings.height);
        }
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) if strict => {
                return Err(BackendError::ConstraintMismatch(format!(
                    "{} refused {}x{}: {}",
                    path, format.width, format.height, err
                )));
            }
            Err(err) => {
                log::warn!("V4l2Camera: failed to set format on {}: {}", path, err);
                device.format().map_err(|err| {
                    BackendError::Device(format!("read format of {} after set failure: {}", path, err))
                })?
            }
        };

        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            BackendError::ConstraintMismatch(format!(
                "{} delivers unsupported pixel format {}",
                path, format.fourcc
            ))
        })?;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .map_err(|err| BackendError::Device(format!("create v4l2 buffer stream: {}", err)))
            },
        }
        .try_build()?;

        let feed = Arc::new(V4l2Feed {
            state: Mutex::new(Some(state)),
            latest: Mutex::new(None),
            width: format.width,
            height: format.height,
            pixel_format,
        });
        // A stream that cannot deliver one frame is not a usable camera.
        feed.read_frame()?;

        log::info!(
            "V4l2Camera: connected to {} ({}x{} {:?})",
            path,
            format.width,
            format.height,
            pixel_format
        );
        Ok(MediaStream {
            id: path.clone(),
            tracks: vec![Box::new(V4l2Track {
                label: path,
                feed: feed.clone(),
                live: true,
            })],
            source: feed,
        })
    }
}

fn map_open_error(path: &str, err: std::io::Error) -> BackendError {
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => {
            BackendError::PermissionDenied(format!("open {}: {}", path, err))
        }
        std::io::ErrorKind::NotFound => BackendError::NotFound(format!("open {}: {}", path, err)),
        _ => BackendError::Device(format!("open {}: {}", path, err)),
    }
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

struct V4l2Feed {
    /// `None` once the track has been stopped.
    state: Mutex<Option<DeviceV4l2State>>,
    latest: Mutex<Option<VideoFrame>>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl V4l2Feed {
    fn state(&self) -> MutexGuard<'_, Option<DeviceV4l2State>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn latest(&self) -> MutexGuard<'_, Option<VideoFrame>> {
        match self.latest.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn shutdown(&self) {
        // Dropping the state unmaps the buffers and closes the device.
        self.state().take();
    }
}

impl FrameSource for V4l2Feed {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn ready_state(&self) -> ReadyState {
        if self.state().is_none() {
            ReadyState::Nothing
        } else if self.latest().is_some() {
            ReadyState::EnoughData
        } else {
            ReadyState::Metadata
        }
    }

    fn read_frame(&self) -> Result<VideoFrame, BackendError> {
        use v4l::io::traits::CaptureStream;

        let raw = {
            let mut state = self.state();
            let state = state
                .as_mut()
                .ok_or_else(|| BackendError::Device("v4l2 stream stopped".into()))?;
            state
                .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
                .map_err(|err| BackendError::Device(format!("capture v4l2 frame: {}", err)))?
        };

        let rgba = normalize_to_rgba(&raw, self.width, self.height, self.pixel_format)?;
        let frame = VideoFrame::new(self.width, self.height, rgba);
        *self.latest() = Some(frame.clone());
        Ok(frame)
    }
}

struct V4l2Track {
    label: String,
    feed: Arc<V4l2Feed>,
    live: bool,
}

impl MediaTrack for V4l2Track {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.feed.shutdown();
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
