//! Barcode scan session.
//!
//! `BarcodeScanSession` composes the camera guard, a decode engine and the
//! confirmation filter:
//!
//! ```text
//! Idle -> Acquiring -> Streaming -> Scanning -> Confirmed -> Stopped
//!            |             |            |
//!            +-----> Error <+------------+
//! Error | Stopped --reset--> Acquiring
//! ```
//!
//! Leaving `Streaming` or `Scanning` by any path stops the engine and releases
//! the camera before any callback fires. Exactly one code is confirmed per
//! session; candidates arriving afterwards are dropped with the channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use crate::camera::{Binding, MediaResourceGuard};
use crate::confirm::{ScanConfirmationFilter, ScanResult};
use crate::config::ConfirmationSettings;
use crate::decode::{DecodeCandidate, DecodeEngine};
use crate::error::CameraError;
use crate::sinks::Hooks;

const WAIT_SLICE: Duration = Duration::from_millis(25);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScanState {
    Idle,
    Acquiring,
    Streaming,
    Scanning,
    Confirmed,
    Stopped,
    Error,
}

impl ScanState {
    /// The camera may be held in this state.
    pub fn holds_camera(&self) -> bool {
        matches!(
            self,
            ScanState::Acquiring | ScanState::Streaming | ScanState::Scanning
        )
    }
}

pub struct BarcodeScanSession {
    state: ScanState,
    history: Vec<ScanState>,
    filter: ScanConfirmationFilter,
    engine: Box<dyn DecodeEngine>,
    candidates: Option<Receiver<DecodeCandidate>>,
    result: Option<ScanResult>,
    observed: u64,
    hooks: Hooks,
}

impl BarcodeScanSession {
    pub fn new(engine: Box<dyn DecodeEngine>, settings: &ConfirmationSettings, hooks: Hooks) -> Self {
        Self {
            state: ScanState::Idle,
            history: vec![ScanState::Idle],
            filter: ScanConfirmationFilter::new(settings),
            engine,
            candidates: None,
            result: None,
            observed: 0,
            hooks,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Every state entered since construction, in order.
    pub fn history(&self) -> &[ScanState] {
        &self.history
    }

    pub fn result(&self) -> Option<&ScanResult> {
        self.result.as_ref()
    }

    pub fn filter(&self) -> &ScanConfirmationFilter {
        &self.filter
    }

    /// Candidates fed to the filter in the current run.
    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Start scanning from `Idle`.
    pub fn start(&mut self, guard: &mut MediaResourceGuard) -> ScanState {
        if self.state != ScanState::Idle {
            log::warn!(
                "BarcodeScanSession: start ignored in state {:?}; use reset",
                self.state
            );
            return self.state;
        }
        self.acquire(guard)
    }

    /// Re-enter `Acquiring` from scratch with a cleared window.
    pub fn reset(&mut self, guard: &mut MediaResourceGuard) -> ScanState {
        if self.state.holds_camera() {
            self.teardown(guard);
        }
        self.filter.reset();
        self.result = None;
        self.observed = 0;
        self.hooks.record("scan.reset", &[]);
        self.acquire(guard)
    }

    /// Stop immediately: engine stopped, camera released, no callback.
    pub fn cancel(&mut self, guard: &mut MediaResourceGuard) {
        if !self.state.holds_camera() {
            return;
        }
        self.teardown(guard);
        self.filter.reset();
        self.hooks.record(
            "scan.cancelled",
            &[("observed", self.observed.to_string())],
        );
        self.enter(ScanState::Stopped);
    }

    /// Forward the surface's metadata-loaded event.
    pub fn on_metadata_loaded(&mut self, guard: &mut MediaResourceGuard) -> ScanState {
        if self.state == ScanState::Acquiring && guard.notify_metadata_loaded() {
            self.begin_streaming(guard);
        }
        self.state
    }

    /// Process whatever is pending without blocking.
    ///
    /// Re-checks readiness while `Acquiring`, then drains queued candidates
    /// in emission order until one is confirmed.
    pub fn pump(&mut self, guard: &mut MediaResourceGuard) -> ScanState {
        if self.state == ScanState::Acquiring && guard.is_ready() {
            self.begin_streaming(guard);
        }
        while self.state == ScanState::Scanning {
            let next = match self.candidates.as_ref() {
                Some(rx) => rx.try_recv(),
                None => break,
            };
            match next {
                Ok(candidate) => {
                    self.observe(guard, candidate);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.state
    }

    /// Block until the session settles, `timeout` elapses, or `cancel` is set.
    ///
    /// Timeout and cancellation both end in `Stopped` with the camera released.
    pub fn run_until_settled(
        &mut self,
        guard: &mut MediaResourceGuard,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> ScanState {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump(guard);
            if !self.state.holds_camera() {
                return self.state;
            }
            if cancel.load(Ordering::SeqCst) {
                log::info!("BarcodeScanSession: cancelled by host");
                self.cancel(guard);
                return self.state;
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "BarcodeScanSession: no code confirmed within {:?} ({} candidates)",
                    timeout,
                    self.observed
                );
                self.cancel(guard);
                return self.state;
            }

            let slice = WAIT_SLICE.min(deadline - now);
            let waited = match (self.state, self.candidates.as_ref()) {
                (ScanState::Scanning, Some(rx)) => rx.recv_timeout(slice),
                _ => Err(RecvTimeoutError::Timeout),
            };
            match waited {
                Ok(candidate) => {
                    self.observe(guard, candidate);
                }
                Err(RecvTimeoutError::Timeout) if self.state != ScanState::Scanning => {
                    std::thread::sleep(slice);
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Producer gone; nothing more will arrive but the deadline still applies.
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(slice),
            }
        }
    }

    /// Feed one candidate. Ignored unless `Scanning`.
    pub fn observe(
        &mut self,
        guard: &mut MediaResourceGuard,
        candidate: DecodeCandidate,
    ) -> Option<ScanResult> {
        if self.state != ScanState::Scanning {
            log::debug!(
                "BarcodeScanSession: dropping candidate in state {:?}",
                self.state
            );
            return None;
        }
        self.observed += 1;
        let accepted = self.filter.observe(&candidate.code)?;
        self.confirm(guard, accepted.clone());
        Some(accepted)
    }

    fn acquire(&mut self, guard: &mut MediaResourceGuard) -> ScanState {
        self.enter(ScanState::Acquiring);
        match guard.acquire() {
            Ok(Binding::Ready) => self.begin_streaming(guard),
            Ok(Binding::AwaitingMetadata) => {
                log::debug!("BarcodeScanSession: waiting for stream metadata");
            }
            Err(err) => self.fail(guard, err),
        }
        self.state
    }

    fn begin_streaming(&mut self, guard: &mut MediaResourceGuard) {
        self.enter(ScanState::Streaming);

        let (tx, rx) = mpsc::channel();
        match self.engine.start(guard.surface(), tx) {
            Ok(()) => {
                self.candidates = Some(rx);
                self.enter(ScanState::Scanning);
                self.hooks.record(
                    "scan.started",
                    &[("engine", self.engine.name().to_string())],
                );
            }
            Err(err) => {
                self.fail(guard, CameraError::DecodeEngineInit(err.to_string()));
            }
        }
    }

    fn confirm(&mut self, guard: &mut MediaResourceGuard, accepted: ScanResult) {
        // Engine first, so nothing else is produced while tearing down.
        self.teardown(guard);
        self.result = Some(accepted.clone());
        self.enter(ScanState::Confirmed);

        log::info!(
            "BarcodeScanSession: confirmed {} after {} candidates",
            accepted.code,
            self.observed
        );
        self.hooks.record(
            "scan.confirmed",
            &[
                ("code", accepted.code.clone()),
                ("observed", self.observed.to_string()),
            ],
        );
        self.hooks.observer().on_scan_confirmed(&accepted.code);
        self.enter(ScanState::Stopped);
    }

    fn fail(&mut self, guard: &mut MediaResourceGuard, err: CameraError) {
        self.teardown(guard);
        self.filter.reset();
        self.enter(ScanState::Error);
        log::error!("BarcodeScanSession: {}", err);
        self.hooks.report_error(&err);
    }

    /// Stop the engine, drop the candidate channel, release the camera.
    fn teardown(&mut self, guard: &mut MediaResourceGuard) {
        if self.engine.is_running() {
            self.engine.stop();
        }
        self.candidates = None;
        guard.release();
    }

    fn enter(&mut self, next: ScanState) {
        log::debug!("BarcodeScanSession: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

impl std::fmt::Debug for BarcodeScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarcodeScanSession")
            .field("state", &self.state)
            .field("engine", &self.engine.name())
            .field("result", &self.result)
            .field("observed", &self.observed)
            .finish()
    }
}

impl Drop for BarcodeScanSession {
    fn drop(&mut self) {
        if self.engine.is_running() {
            self.engine.stop();
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{FrameSurface, SyntheticCamera, SyntheticControl};
    use crate::config::CameraSettings;
    use crate::decode::ScriptedDecodeEngine;
    use crate::error::{BackendError, ErrorKind};
    use crate::frame::ReadyState;
    use crate::sinks::RecordingObserver;
    use std::sync::Arc;

    struct Rig {
        guard: MediaResourceGuard,
        control: SyntheticControl,
        observer: Arc<RecordingObserver>,
        hooks: Hooks,
    }

    fn rig() -> Rig {
        let camera = SyntheticCamera::new("stub://rear");
        let control = camera.control();
        let observer = Arc::new(RecordingObserver::new());
        let hooks = Hooks::new(observer.clone());
        let guard = MediaResourceGuard::new(
            Box::new(camera),
            Arc::new(FrameSurface::new()),
            CameraSettings::default(),
            hooks.clone(),
        );
        Rig {
            guard,
            control,
            observer,
            hooks,
        }
    }

    fn session(rig: &Rig, engine: ScriptedDecodeEngine) -> BarcodeScanSession {
        BarcodeScanSession::new(
            Box::new(engine),
            &ConfirmationSettings::default(),
            rig.hooks.clone(),
        )
    }

    #[test]
    fn confirms_and_releases() {
        let mut rig = rig();
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["ABC", "XYZ", "ABC", "ABC"]));

        assert_eq!(scan.start(&mut rig.guard), ScanState::Scanning);
        assert_eq!(scan.pump(&mut rig.guard), ScanState::Stopped);

        assert_eq!(scan.result().map(|r| r.code.as_str()), Some("ABC"));
        assert_eq!(rig.observer.confirmed_codes(), vec!["ABC"]);
        assert_eq!(rig.control.live_tracks(), 0);
        assert!(!rig.guard.is_active());
    }

    #[test]
    fn late_candidates_after_confirmation_are_ignored() {
        let mut rig = rig();
        let mut scan = session(
            &rig,
            ScriptedDecodeEngine::new(["A", "A", "A", "B", "B", "B", "B"]),
        );
        scan.start(&mut rig.guard);
        scan.pump(&mut rig.guard);

        assert_eq!(scan.observed(), 3);
        assert!(scan
            .observe(&mut rig.guard, DecodeCandidate::new("B"))
            .is_none());
        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(rig.observer.confirmed_codes(), vec!["A"]);
    }

    #[test]
    fn engine_init_failure_is_error_and_releases() {
        let mut rig = rig();
        let mut scan = session(&rig, ScriptedDecodeEngine::failing("zxing wasm missing"));

        assert_eq!(scan.start(&mut rig.guard), ScanState::Error);
        assert_eq!(
            scan.history(),
            &[
                ScanState::Idle,
                ScanState::Acquiring,
                ScanState::Streaming,
                ScanState::Error
            ]
        );
        assert_eq!(rig.control.live_tracks(), 0);
        assert_eq!(rig.observer.errors()[0].0, ErrorKind::DecodeEngineInitFailed);

        // No resurrection from stray candidates.
        scan.observe(&mut rig.guard, DecodeCandidate::new("X"));
        assert_eq!(scan.state(), ScanState::Error);
    }

    #[test]
    fn waits_for_metadata_before_streaming() {
        let mut rig = rig();
        rig.control.set_ready_state(ReadyState::Nothing);
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["1"]));

        assert_eq!(scan.start(&mut rig.guard), ScanState::Acquiring);
        assert_eq!(scan.on_metadata_loaded(&mut rig.guard), ScanState::Acquiring);

        rig.control.set_ready_state(ReadyState::Metadata);
        assert_eq!(scan.on_metadata_loaded(&mut rig.guard), ScanState::Scanning);
    }

    #[test]
    fn reset_after_error_starts_fresh() {
        let mut rig = rig();
        rig.control.deny_all();
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["9", "9", "9"]));

        assert_eq!(scan.start(&mut rig.guard), ScanState::Error);
        assert_eq!(rig.observer.errors()[0].0, ErrorKind::NoCameraAvailable);

        rig.control.clear_failures();
        assert_eq!(scan.reset(&mut rig.guard), ScanState::Scanning);
        assert!(scan.filter().window().is_empty());
        assert_eq!(scan.pump(&mut rig.guard), ScanState::Stopped);
        assert_eq!(rig.observer.confirmed_codes(), vec!["9"]);
    }

    #[test]
    fn reset_while_scanning_releases_exactly_once() {
        let mut rig = rig();
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["1", "2"]));
        scan.start(&mut rig.guard);
        scan.pump(&mut rig.guard);
        assert_eq!(scan.state(), ScanState::Scanning);
        assert_eq!(scan.filter().window().len(), 2);

        scan.reset(&mut rig.guard);
        assert_eq!(rig.control.track_stops(), 1);
        assert_eq!(rig.control.live_tracks(), 1);
        assert_eq!(rig.control.streams_opened(), 2);
        assert!(scan.filter().window().is_empty());
    }

    #[test]
    fn cancel_stops_without_callbacks() {
        let mut rig = rig();
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["1"]));
        scan.start(&mut rig.guard);

        scan.cancel(&mut rig.guard);
        scan.cancel(&mut rig.guard);

        assert_eq!(scan.state(), ScanState::Stopped);
        assert_eq!(rig.control.track_stops(), 1);
        assert!(rig.observer.events().is_empty());
    }

    #[test]
    fn start_outside_idle_is_ignored() {
        let mut rig = rig();
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["1"]));
        scan.start(&mut rig.guard);
        assert_eq!(scan.start(&mut rig.guard), ScanState::Scanning);
        assert_eq!(rig.control.streams_opened(), 1);
    }

    #[test]
    fn run_until_settled_times_out_into_stopped() {
        let mut rig = rig();
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["1", "2", "3"]));
        scan.start(&mut rig.guard);

        let cancel = AtomicBool::new(false);
        let state = scan.run_until_settled(&mut rig.guard, Duration::from_millis(60), &cancel);
        assert_eq!(state, ScanState::Stopped);
        assert!(scan.result().is_none());
        assert_eq!(rig.control.live_tracks(), 0);
    }

    #[test]
    fn run_until_settled_honours_cancel_flag() {
        let mut rig = rig();
        rig.control
            .fail_environment(BackendError::ConstraintMismatch("1280x720".into()));
        let mut scan = session(&rig, ScriptedDecodeEngine::new(["1"]));
        scan.start(&mut rig.guard);

        let cancel = AtomicBool::new(true);
        let state = scan.run_until_settled(&mut rig.guard, Duration::from_secs(5), &cancel);
        assert_eq!(state, ScanState::Stopped);
        assert_eq!(rig.control.live_tracks(), 0);
    }
}
