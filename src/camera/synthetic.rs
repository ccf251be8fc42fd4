//! Synthetic camera for `stub://` devices.
//!
//! The synthetic camera is responsible for:
//! - Answering stream requests like a real backend (including failures)
//! - Producing generated RGBA frames in-memory
//! - Counting track stops so release discipline can be checked
//!
//! Behaviour is scripted through a `SyntheticControl` handle that stays with
//! the caller after the backend is boxed into a guard.

use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{
    CameraBackend, FrameSource, MediaStream, MediaTrack, StreamRequest,
};
use crate::error::BackendError;
use crate::frame::{ReadyState, VideoFrame};

const UNCONSTRAINED_WIDTH: u32 = 640;
const UNCONSTRAINED_HEIGHT: u32 = 480;

#[derive(Debug)]
struct SyntheticState {
    device: String,
    environment_failure: Option<BackendError>,
    fallback_failure: Option<BackendError>,
    frame_failure: Option<BackendError>,
    ready_state: ReadyState,
    requests: Vec<StreamRequest>,
    streams_opened: u64,
    live_tracks: usize,
    track_stops: u64,
    frame_count: u64,
    /// Simulated scene, changes every 50 frames.
    scene_state: u8,
}

/// Script and inspect a `SyntheticCamera` from outside the guard.
#[derive(Clone, Debug)]
pub struct SyntheticControl {
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticControl {
    fn lock(&self) -> MutexGuard<'_, SyntheticState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Make every environment-facing (constrained) request fail.
    pub fn fail_environment(&self, err: BackendError) {
        self.lock().environment_failure = Some(err);
    }

    /// Make every unconstrained request fail.
    pub fn fail_fallback(&self, err: BackendError) {
        self.lock().fallback_failure = Some(err);
    }

    /// Deny camera access outright.
    pub fn deny_all(&self) {
        let mut state = self.lock();
        let denied = BackendError::PermissionDenied(format!("{} access denied", state.device));
        state.environment_failure = Some(denied.clone());
        state.fallback_failure = Some(denied);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.environment_failure = None;
        state.fallback_failure = None;
        state.frame_failure = None;
    }

    /// Make frame rendering fail (e.g. a lost drawing context).
    pub fn fail_frames(&self, err: BackendError) {
        self.lock().frame_failure = Some(err);
    }

    /// Readiness reported by every stream of this camera.
    pub fn set_ready_state(&self, ready_state: ReadyState) {
        self.lock().ready_state = ready_state;
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.lock().requests.clone()
    }

    pub fn streams_opened(&self) -> u64 {
        self.lock().streams_opened
    }

    pub fn live_tracks(&self) -> usize {
        self.lock().live_tracks
    }

    /// Effective track stops (a repeated stop on a dead track is not counted).
    pub fn track_stops(&self) -> u64 {
        self.lock().track_stops
    }

    pub fn frames_rendered(&self) -> u64 {
        self.lock().frame_count
    }
}

/// Camera backend producing generated frames.
pub struct SyntheticCamera {
    control: SyntheticControl,
}

impl SyntheticCamera {
    pub fn new(device: &str) -> Self {
        let state = SyntheticState {
            device: device.to_string(),
            environment_failure: None,
            fallback_failure: None,
            frame_failure: None,
            ready_state: ReadyState::EnoughData,
            requests: Vec::new(),
            streams_opened: 0,
            live_tracks: 0,
            track_stops: 0,
            frame_count: 0,
            scene_state: 0,
        };
        Self {
            control: SyntheticControl {
                state: Arc::new(Mutex::new(state)),
            },
        }
    }

    pub fn control(&self) -> SyntheticControl {
        self.control.clone()
    }
}

impl CameraBackend for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&mut self, request: &StreamRequest) -> Result<MediaStream, BackendError> {
        let mut state = self.control.lock();
        state.requests.push(request.clone());

        let failure = if request.is_unconstrained() {
            state.fallback_failure.clone()
        } else {
            state.environment_failure.clone()
        };
        if let Some(err) = failure {
            log::debug!("SyntheticCamera: {} refused {:?}: {}", state.device, request, err);
            return Err(err);
        }

        state.streams_opened += 1;
        state.live_tracks += 1;
        let id = format!("{}#{}", state.device, state.streams_opened);
        let width = request.width.unwrap_or(UNCONSTRAINED_WIDTH);
        let height = request.height.unwrap_or(UNCONSTRAINED_HEIGHT);
        log::info!(
            "SyntheticCamera: opened {} ({}x{})",
            id,
            width,
            height
        );

        let track = SyntheticTrack {
            label: format!("{} video", state.device),
            live: true,
            control: self.control.clone(),
        };
        let feed = SyntheticFeed {
            control: self.control.clone(),
            width,
            height,
        };
        Ok(MediaStream {
            id,
            tracks: vec![Box::new(track)],
            source: Arc::new(feed),
        })
    }
}

struct SyntheticTrack {
    label: String,
    live: bool,
    control: SyntheticControl,
}

impl MediaTrack for SyntheticTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        let mut state = self.control.lock();
        state.live_tracks = state.live_tracks.saturating_sub(1);
        state.track_stops += 1;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

struct SyntheticFeed {
    control: SyntheticControl,
    width: u32,
    height: u32,
}

impl FrameSource for SyntheticFeed {
    fn dimensions(&self) -> (u32, u32) {
        if self.control.lock().ready_state.has_metadata() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.control.lock().ready_state
    }

    fn read_frame(&self) -> Result<VideoFrame, BackendError> {
        let mut state = self.control.lock();
        if let Some(err) = state.frame_failure.clone() {
            return Err(err);
        }
        if state.ready_state < ReadyState::CurrentData {
            return Err(BackendError::Device("no frame decoded yet".into()));
        }

        state.frame_count += 1;
        if state.frame_count % 50 == 0 {
            state.scene_state = state.scene_state.wrapping_add(1);
        }
        let rgba = generate_synthetic_pixels(
            self.width,
            self.height,
            state.frame_count,
            state.scene_state,
        );
        Ok(VideoFrame::new(self.width, self.height, rgba))
    }
}

/// Gradient keyed on frame count and scene, with a little sensor noise.
fn generate_synthetic_pixels(width: u32, height: u32, frame_count: u64, scene: u8) -> Vec<u8> {
    let pixel_count = width as usize * height as usize;
    let mut rng = rand::thread_rng();
    let mut rgba = vec![0u8; pixel_count * 4];
    for (i, px) in rgba.chunks_exact_mut(4).enumerate() {
        let base = (i as u64 + frame_count + scene as u64) % 256;
        let noise: u8 = rng.gen_range(0..4);
        px[0] = (base as u8).wrapping_add(noise);
        px[1] = (base as u8).wrapping_add(scene);
        px[2] = 255 - base as u8;
        px[3] = 255;
    }
    rgba
}
