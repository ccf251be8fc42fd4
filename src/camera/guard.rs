//! Camera ownership.
//!
//! `MediaResourceGuard` is the only path to camera hardware. It is responsible for:
//! - Requesting the environment-facing camera, with one unconstrained fallback
//! - Binding the stream to the display surface (muted)
//! - Reporting readiness once the surface knows the stream dimensions
//! - Releasing every track on every exit path, idempotently
//!
//! The guard MUST NOT:
//! - Hold more than one `MediaSession` at a time
//! - Retry acquisition beyond the single fallback

use std::sync::Arc;

use super::backend::{CameraBackend, MediaStream, MediaTrack, StreamRequest, VideoSurface};
use crate::config::CameraSettings;
use crate::error::{BackendError, CameraError};
use crate::sinks::Hooks;

/// Which request produced the current stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOrigin {
    Environment,
    Fallback,
}

impl StreamOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOrigin::Environment => "environment",
            StreamOrigin::Fallback => "fallback",
        }
    }
}

/// Binding status right after acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Surface already reports stream metadata.
    Ready,
    /// Waiting for the surface's metadata-loaded event.
    AwaitingMetadata,
}

/// A live camera stream bound to the guard's surface.
pub struct MediaSession {
    id: u64,
    stream_id: String,
    origin: StreamOrigin,
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl MediaSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn origin(&self) -> StreamOrigin {
        self.origin
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|track| track.is_live()).count()
    }

    /// Stop every live track. Dead tracks are skipped, so repeated calls are no-ops.
    fn stop_tracks(&mut self) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut().filter(|track| track.is_live()) {
            log::debug!("MediaSession {}: stopping {}", self.id, track.label());
            track.stop();
            stopped += 1;
        }
        stopped
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("origin", &self.origin)
            .field("live_tracks", &self.live_tracks())
            .finish()
    }
}

/// Exclusive owner of the camera for one screen.
pub struct MediaResourceGuard {
    backend: Box<dyn CameraBackend>,
    surface: Arc<dyn VideoSurface>,
    settings: CameraSettings,
    session: Option<MediaSession>,
    next_session_id: u64,
    hooks: Hooks,
}

impl MediaResourceGuard {
    pub fn new(
        backend: Box<dyn CameraBackend>,
        surface: Arc<dyn VideoSurface>,
        settings: CameraSettings,
        hooks: Hooks,
    ) -> Self {
        Self {
            backend,
            surface,
            settings,
            session: None,
            next_session_id: 1,
            hooks,
        }
    }

    /// Acquire the camera and bind it to the surface.
    ///
    /// Any session already held is released first. On failure nothing stays
    /// open and the surface is unbound.
    pub fn acquire(&mut self) -> Result<Binding, CameraError> {
        if self.session.is_some() {
            log::warn!("MediaResourceGuard: acquire while holding a session; releasing it first");
            self.release();
        }

        let (stream, origin) = match self.open_with_fallback() {
            Ok(opened) => opened,
            Err(err) => {
                // Stale binding must not outlive a failed acquisition.
                self.surface.detach();
                return Err(err);
            }
        };
        Ok(self.bind(stream, origin))
    }

    fn open_with_fallback(&mut self) -> Result<(MediaStream, StreamOrigin), CameraError> {
        let preferred = StreamRequest::environment(self.settings.width, self.settings.height);
        let env_err = match self.backend.open(&preferred) {
            Ok(stream) => return Ok((stream, StreamOrigin::Environment)),
            Err(err) => err,
        };
        log::warn!(
            "MediaResourceGuard: environment camera request on {} failed ({}); falling back",
            self.backend.name(),
            env_err
        );
        self.hooks.record(
            "camera.fallback",
            &[("backend", self.backend.name().to_string()), ("cause", env_err.to_string())],
        );

        match self.backend.open(&StreamRequest::unconstrained()) {
            Ok(stream) => Ok((stream, StreamOrigin::Fallback)),
            Err(fallback_err) => {
                log::error!(
                    "MediaResourceGuard: no camera available on {} (environment: {}; fallback: {})",
                    self.backend.name(),
                    env_err,
                    fallback_err
                );
                Err(CameraError::NoCamera {
                    cause: describe_failure(&env_err, &fallback_err),
                })
            }
        }
    }

    fn bind(&mut self, stream: MediaStream, origin: StreamOrigin) -> Binding {
        let id = self.next_session_id;
        self.next_session_id += 1;

        self.surface.attach(stream.source.clone());
        self.surface.set_muted(true);

        let session = MediaSession {
            id,
            stream_id: stream.id,
            origin,
            tracks: stream.tracks,
        };
        log::info!(
            "MediaResourceGuard: session {} bound ({} via {})",
            id,
            session.stream_id,
            origin.as_str()
        );
        self.hooks.record(
            "camera.acquired",
            &[
                ("session", id.to_string()),
                ("origin", origin.as_str().to_string()),
            ],
        );
        self.session = Some(session);

        if self.is_ready() {
            Binding::Ready
        } else {
            Binding::AwaitingMetadata
        }
    }

    /// Re-check readiness after the surface's metadata-loaded event.
    pub fn notify_metadata_loaded(&mut self) -> bool {
        let ready = self.is_ready();
        if !ready {
            log::debug!("MediaResourceGuard: metadata event without known dimensions");
        }
        ready
    }

    /// A session is held and the surface knows the stream dimensions.
    pub fn is_ready(&self) -> bool {
        if self.session.is_none() {
            return false;
        }
        let (width, height) = self.surface.dimensions();
        self.surface.ready_state().has_metadata() && width > 0 && height > 0
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&MediaSession> {
        self.session.as_ref()
    }

    pub fn surface(&self) -> Arc<dyn VideoSurface> {
        self.surface.clone()
    }

    /// Stop every track and clear the surface binding.
    ///
    /// Idempotent. Returns true when a session was actually released.
    pub fn release(&mut self) -> bool {
        self.surface.detach();
        let Some(mut session) = self.session.take() else {
            return false;
        };
        let stopped = session.stop_tracks();
        log::info!(
            "MediaResourceGuard: session {} released ({} tracks stopped)",
            session.id,
            stopped
        );
        self.hooks.record(
            "camera.released",
            &[
                ("session", session.id.to_string()),
                ("tracks", stopped.to_string()),
            ],
        );
        true
    }
}

impl Drop for MediaResourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResourceGuard")
            .field("backend", &self.backend.name())
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

fn describe_failure(env_err: &BackendError, fallback_err: &BackendError) -> String {
    if env_err == fallback_err {
        fallback_err.to_string()
    } else {
        format!("{} (environment camera: {})", fallback_err, env_err)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
