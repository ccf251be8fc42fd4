//! One camera screen.
//!
//! `CameraScreen` owns the guard together with both camera consumers. Scanning
//! and still capture take turns: starting one cancels the other, so the guard
//! never serves two sessions. Dropping the screen is disposal; the camera is
//! released on every path.

use anyhow::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{self, Binding, CameraBackend, FrameSurface, MediaResourceGuard, VideoSurface};
use crate::capture::{CaptureOutcome, CapturedImage, StillCaptureController};
use crate::config::ScannerConfig;
use crate::decode::{BarcodeDecoder, DecodeEngine, SamplingDecodeEngine};
use crate::error::CameraError;
use crate::session::{BarcodeScanSession, ScanState};
use crate::sinks::Hooks;

#[derive(Debug)]
pub struct CameraScreen {
    guard: MediaResourceGuard,
    scanner: BarcodeScanSession,
    still: StillCaptureController,
    disposed: bool,
}

impl CameraScreen {
    pub fn new(
        backend: Box<dyn CameraBackend>,
        surface: Arc<dyn VideoSurface>,
        engine: Box<dyn DecodeEngine>,
        config: &ScannerConfig,
        hooks: Hooks,
    ) -> Self {
        Self {
            guard: MediaResourceGuard::new(backend, surface, config.camera.clone(), hooks.clone()),
            scanner: BarcodeScanSession::new(engine, &config.confirmation, hooks.clone()),
            still: StillCaptureController::new(config.capture.clone(), hooks),
            disposed: false,
        }
    }

    /// Screen whose scanner samples the surface with `decoder` at
    /// `decode.sample_hz`.
    pub fn with_decoder<D: BarcodeDecoder + 'static>(
        backend: Box<dyn CameraBackend>,
        surface: Arc<dyn VideoSurface>,
        decoder: D,
        config: &ScannerConfig,
        hooks: Hooks,
    ) -> Self {
        let engine = SamplingDecodeEngine::from_settings(decoder, &config.decode);
        Self::new(backend, surface, Box::new(engine), config, hooks)
    }

    /// Screen over the configured device with a headless surface.
    pub fn from_config<D: BarcodeDecoder + 'static>(
        config: &ScannerConfig,
        decoder: D,
        hooks: Hooks,
    ) -> Result<Self> {
        let backend = camera::open_backend(&config.camera)?;
        Ok(Self::with_decoder(
            backend,
            Arc::new(FrameSurface::new()),
            decoder,
            config,
            hooks,
        ))
    }

    pub fn guard(&self) -> &MediaResourceGuard {
        &self.guard
    }

    pub fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    pub fn scanner(&self) -> &BarcodeScanSession {
        &self.scanner
    }

    pub fn still(&self) -> &StillCaptureController {
        &self.still
    }

    /// Start scanning, or restart it after `Confirmed`, `Stopped` or `Error`.
    pub fn start_scan(&mut self) -> ScanState {
        self.still.cancel();
        if self.scanner.state() == ScanState::Idle {
            self.scanner.start(&mut self.guard)
        } else {
            self.scanner.reset(&mut self.guard)
        }
    }

    pub fn reset_scan(&mut self) -> ScanState {
        self.still.cancel();
        self.scanner.reset(&mut self.guard)
    }

    pub fn cancel_scan(&mut self) {
        self.scanner.cancel(&mut self.guard);
    }

    /// Forward the surface's metadata-loaded event.
    pub fn on_metadata_loaded(&mut self) -> ScanState {
        self.scanner.on_metadata_loaded(&mut self.guard)
    }

    pub fn pump(&mut self) -> ScanState {
        self.scanner.pump(&mut self.guard)
    }

    pub fn run_scan_until_settled(&mut self, timeout: Duration, cancel: &AtomicBool) -> ScanState {
        self.scanner.run_until_settled(&mut self.guard, timeout, cancel)
    }

    /// Turn the camera on for still capture. Cancels any running scan.
    pub fn activate_capture(&mut self) -> Result<Binding, CameraError> {
        self.scanner.cancel(&mut self.guard);
        self.still.activate(&mut self.guard)
    }

    /// Request a still. A running scan is cancelled and the camera
    /// re-activated for capture first.
    pub fn capture(&mut self, now: Instant) -> Result<CaptureOutcome, CameraError> {
        self.take_camera_from_scan()?;
        self.still.capture(&mut self.guard, now)
    }

    pub fn poll_capture(&mut self, now: Instant) -> Result<Option<CapturedImage>, CameraError> {
        self.still.poll(&mut self.guard, now)
    }

    pub fn capture_blocking(&mut self) -> Result<CapturedImage, CameraError> {
        self.take_camera_from_scan()?;
        self.still.capture_blocking(&mut self.guard)
    }

    fn take_camera_from_scan(&mut self) -> Result<(), CameraError> {
        if !self.scanner.state().holds_camera() {
            return Ok(());
        }
        log::debug!("CameraScreen: still capture requested while scanning; stopping scan");
        self.activate_capture().map(|_| ())
    }

    /// Stop everything and release the camera. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.still.cancel();
        self.scanner.cancel(&mut self.guard);
        self.guard.release();
        log::debug!("CameraScreen: disposed");
    }
}

impl Drop for CameraScreen {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SyntheticCamera, SyntheticControl};
    use crate::decode::ScriptedDecodeEngine;
    use crate::sinks::{Observed, RecordingObserver};

    fn screen(codes: &[&str]) -> (CameraScreen, SyntheticControl, Arc<RecordingObserver>) {
        let camera = SyntheticCamera::new("stub://screen");
        let control = camera.control();
        let observer = Arc::new(RecordingObserver::new());
        let screen = CameraScreen::new(
            Box::new(camera),
            Arc::new(FrameSurface::new()),
            Box::new(ScriptedDecodeEngine::new(codes.iter().copied())),
            &ScannerConfig::default(),
            Hooks::new(observer.clone()),
        );
        (screen, control, observer)
    }

    #[test]
    fn capture_after_scan_cancels_scan_first() {
        let (mut screen, control, observer) = screen(&["1", "2"]);
        assert_eq!(screen.start_scan(), ScanState::Scanning);

        screen.activate_capture().expect("activate");
        assert_eq!(screen.scan_state(), ScanState::Stopped);
        assert_eq!(control.live_tracks(), 1);

        let image = screen.capture_blocking().expect("capture");
        assert!(image.data_uri.starts_with("data:image/jpeg;base64,"));
        assert_eq!(control.live_tracks(), 0);
        assert!(matches!(observer.events()[0], Observed::CaptureComplete(_)));
    }

    #[test]
    fn capture_while_scanning_hands_camera_over() {
        let (mut screen, control, observer) = screen(&["1", "2"]);
        assert_eq!(screen.start_scan(), ScanState::Scanning);

        match screen.capture(Instant::now()).expect("capture") {
            CaptureOutcome::Captured(_) => {}
            other => panic!("expected a capture, got {:?}", other),
        }

        assert_eq!(screen.scan_state(), ScanState::Stopped);
        assert!(!screen.guard().is_active());
        assert_eq!(control.streams_opened(), 2);
        assert_eq!(control.track_stops(), 2);
        assert_eq!(control.live_tracks(), 0);

        // The cancelled scan stays down; no late confirmation.
        assert_eq!(screen.pump(), ScanState::Stopped);
        assert!(observer.confirmed_codes().is_empty());
        assert_eq!(observer.events().len(), 1);
    }

    #[test]
    fn blocking_capture_while_scanning_stops_the_scan() {
        let (mut screen, control, _observer) = screen(&["1"]);
        screen.start_scan();

        screen.capture_blocking().expect("capture");
        assert_eq!(screen.scan_state(), ScanState::Stopped);
        assert_eq!(control.live_tracks(), 0);
    }

    #[test]
    fn scan_restarts_after_confirmation() {
        let (mut screen, control, observer) = screen(&["7", "7", "7"]);
        screen.start_scan();
        assert_eq!(screen.pump(), ScanState::Stopped);

        assert_eq!(screen.start_scan(), ScanState::Scanning);
        assert_eq!(screen.pump(), ScanState::Stopped);
        assert_eq!(observer.confirmed_codes(), vec!["7", "7"]);
        assert_eq!(control.live_tracks(), 0);
    }

    #[test]
    fn drop_releases_camera_mid_scan() {
        let (mut screen, control, observer) = screen(&["1"]);
        screen.start_scan();
        assert_eq!(control.live_tracks(), 1);

        drop(screen);
        assert_eq!(control.live_tracks(), 0);
        assert!(observer.events().is_empty());
    }
}
