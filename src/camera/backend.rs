use std::sync::Arc;

use crate::error::BackendError;
use crate::frame::{ReadyState, VideoFrame};

/// Which way the requested camera should face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facing {
    /// Rear camera, pointed away from the user.
    Environment,
}

/// A camera stream request.
///
/// `None` fields are unconstrained. Audio is never requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub facing: Option<Facing>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl StreamRequest {
    /// Environment-facing camera at an ideal resolution.
    pub fn environment(width: u32, height: u32) -> Self {
        Self {
            facing: Some(Facing::Environment),
            width: Some(width),
            height: Some(height),
        }
    }

    /// Any camera, any resolution.
    pub fn unconstrained() -> Self {
        Self {
            facing: None,
            width: None,
            height: None,
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.facing.is_none() && self.width.is_none() && self.height.is_none()
    }
}

/// One hardware track of a stream.
pub trait MediaTrack: Send {
    fn label(&self) -> &str;

    /// Stop the track. Must tolerate repeated calls.
    fn stop(&mut self);

    fn is_live(&self) -> bool;
}

/// Frame producer behind a stream. Surfaces pull from it.
pub trait FrameSource: Send + Sync {
    /// Negotiated dimensions, `(0, 0)` until known.
    fn dimensions(&self) -> (u32, u32);

    fn ready_state(&self) -> ReadyState;

    /// Most recent decoded frame.
    fn read_frame(&self) -> Result<VideoFrame, BackendError>;
}

/// A stream handed out by a backend: hardware tracks plus the frame source.
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<Box<dyn MediaTrack>>,
    pub source: Arc<dyn FrameSource>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .finish_non_exhaustive()
    }
}

/// Ambient camera access.
///
/// # Contract
///
/// `open` either returns a live stream or an error describing why the request
/// could not be satisfied. It MUST NOT retry internally; fallback policy lives
/// in `MediaResourceGuard`.
pub trait CameraBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn open(&mut self, request: &StreamRequest) -> Result<MediaStream, BackendError>;
}

/// Display surface a stream is bound to.
///
/// Implementations use interior mutability: the surface is shared between the
/// guard and the decode engine's sampling loop.
pub trait VideoSurface: Send + Sync {
    fn attach(&self, source: Arc<dyn FrameSource>);

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    /// Drop the binding. Must tolerate repeated calls.
    fn detach(&self);

    fn is_attached(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    fn dimensions(&self) -> (u32, u32);

    /// Render the current frame.
    fn render_frame(&self) -> Result<VideoFrame, BackendError>;
}
