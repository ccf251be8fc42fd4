use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use scan_kernel::{
    BackendError, BarcodeDecoder, CameraError, CameraScreen, CaptureOutcome, CapturedImage,
    ErrorKind, FrameSurface, Hooks, ReadyState, RecordingObserver, ScanObserver, ScanState,
    ScannerConfig, ScriptedDecodeEngine, SyntheticCamera, SyntheticControl, VideoFrame,
};

/// Records how many tracks were live at the moment each callback fired.
struct ReleaseProbe {
    control: SyntheticControl,
    live_at_callback: Mutex<Vec<(String, usize)>>,
}

impl ReleaseProbe {
    fn new(control: SyntheticControl) -> Self {
        Self {
            control,
            live_at_callback: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(String, usize)>> {
        self.live_at_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn note(&self, what: &str) {
        let live = self.control.live_tracks();
        self.entries().push((what.to_string(), live));
    }

    fn seen(&self) -> Vec<(String, usize)> {
        self.entries().clone()
    }
}

impl ScanObserver for ReleaseProbe {
    fn on_scan_confirmed(&self, code: &str) {
        self.note(&format!("confirmed:{}", code));
    }

    fn on_capture_complete(&self, _image: &CapturedImage) {
        self.note("captured");
    }

    fn on_error(&self, kind: ErrorKind, _message: &str) {
        self.note(kind.as_str());
    }
}

fn screen_with(
    codes: &[&str],
    observer: impl FnOnce(SyntheticControl) -> Arc<dyn ScanObserver>,
) -> (CameraScreen, SyntheticControl) {
    let camera = SyntheticCamera::new("stub://rear_camera");
    let control = camera.control();
    let hooks = Hooks::new(observer(control.clone()));
    let screen = CameraScreen::new(
        Box::new(camera),
        Arc::new(FrameSurface::new()),
        Box::new(ScriptedDecodeEngine::new(codes.iter().copied())),
        &ScannerConfig::default(),
        hooks,
    );
    (screen, control)
}

#[test]
fn scenario_a_confirms_after_release() {
    let mut probe_slot = None;
    let (mut screen, control) = screen_with(&["ABC", "XYZ", "ABC", "ABC"], |control| {
        let probe = Arc::new(ReleaseProbe::new(control));
        probe_slot = Some(probe.clone());
        probe
    });
    let probe = probe_slot.expect("probe installed");

    assert_eq!(screen.start_scan(), ScanState::Scanning);
    assert_eq!(screen.pump(), ScanState::Stopped);

    assert_eq!(
        screen.scanner().history(),
        &[
            ScanState::Idle,
            ScanState::Acquiring,
            ScanState::Streaming,
            ScanState::Scanning,
            ScanState::Confirmed,
            ScanState::Stopped,
        ]
    );
    assert_eq!(probe.seen(), vec![("confirmed:ABC".to_string(), 0)]);
    assert_eq!(control.live_tracks(), 0);
    assert_eq!(control.track_stops(), 1);
}

#[test]
fn scenario_b_fallback_reaches_streaming_without_error() {
    let observer = Arc::new(RecordingObserver::new());
    let recorder = observer.clone();
    let (mut screen, control) = screen_with(&["A"], |control| {
        control.fail_environment(BackendError::NotFound("no environment-facing camera".into()));
        recorder
    });

    assert_eq!(screen.start_scan(), ScanState::Scanning);
    assert!(screen
        .scanner()
        .history()
        .contains(&ScanState::Streaming));
    assert!(observer.errors().is_empty());
    assert_eq!(control.requests().len(), 2);
    assert!(control.requests()[1].is_unconstrained());
    assert_eq!(control.live_tracks(), 1);
}

#[test]
fn scenario_c_no_camera_reports_once_and_leaves_nothing_open() {
    let observer = Arc::new(RecordingObserver::new());
    let recorder = observer.clone();
    let (mut screen, control) = screen_with(&["A", "A", "A"], |control| {
        control.deny_all();
        recorder
    });

    assert_eq!(screen.start_scan(), ScanState::Error);

    let errors = observer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, ErrorKind::NoCameraAvailable);
    assert!(!screen.guard().is_active());
    assert!(!screen.guard().surface().is_attached());
    assert_eq!(control.live_tracks(), 0);

    // Pumping in Error never resurrects the session.
    assert_eq!(screen.pump(), ScanState::Error);
    assert!(observer.confirmed_codes().is_empty());
}

#[test]
fn scenario_d_single_retry_produces_image() {
    let observer = Arc::new(RecordingObserver::new());
    let recorder = observer.clone();
    let (mut screen, control) = screen_with(&[], |control| {
        control.set_ready_state(ReadyState::Nothing);
        recorder
    });

    screen.activate_capture().expect("activate");
    let now = Instant::now();
    let at = match screen.capture(now).expect("capture request") {
        CaptureOutcome::RetryScheduled { at } => at,
        other => panic!("expected a scheduled retry, got {:?}", other),
    };
    assert_eq!(screen.capture(now).expect("second request"), CaptureOutcome::Suppressed);

    control.set_ready_state(ReadyState::EnoughData);
    let image = screen
        .poll_capture(at)
        .expect("retry")
        .expect("image after retry");

    assert!(image.data_uri.starts_with("data:image/jpeg;base64,"));
    assert_eq!((image.width, image.height), (1024, 576));
    assert_eq!(control.live_tracks(), 0);
    assert_eq!(control.frames_rendered(), 1);
    assert_eq!(observer.events().len(), 1);
}

#[test]
fn retry_still_not_ready_is_recoverable() {
    let observer = Arc::new(RecordingObserver::new());
    let recorder = observer.clone();
    let (mut screen, control) = screen_with(&[], |control| {
        control.set_ready_state(ReadyState::Nothing);
        recorder
    });

    screen.activate_capture().expect("activate");
    let now = Instant::now();
    let at = match screen.capture(now).expect("capture request") {
        CaptureOutcome::RetryScheduled { at } => at,
        other => panic!("expected a scheduled retry, got {:?}", other),
    };
    let err = screen.poll_capture(at).expect_err("still not ready");
    assert!(matches!(err, CameraError::NotReady { .. }));
    assert_eq!(observer.errors()[0].0, ErrorKind::CameraNotReady);
    assert_eq!(control.live_tracks(), 1);

    // Manual retry once frames flow.
    control.set_ready_state(ReadyState::EnoughData);
    match screen.capture(Instant::now()).expect("manual retry") {
        CaptureOutcome::Captured(_) => {}
        other => panic!("expected a capture, got {:?}", other),
    }
    assert_eq!(control.live_tracks(), 0);
}

#[test]
fn reset_after_error_reacquires_cleanly() {
    let observer = Arc::new(RecordingObserver::new());
    let recorder = observer.clone();
    let (mut screen, control) = screen_with(&["X", "X", "X"], |control| {
        control.deny_all();
        recorder
    });

    assert_eq!(screen.start_scan(), ScanState::Error);
    control.clear_failures();
    assert_eq!(screen.reset_scan(), ScanState::Scanning);
    assert_eq!(screen.pump(), ScanState::Stopped);

    assert_eq!(observer.confirmed_codes(), vec!["X"]);
    assert_eq!(control.live_tracks(), 0);
}

/// Reads the same code off every well-formed frame and counts attempts.
struct FixedCodeDecoder {
    calls: Arc<AtomicUsize>,
}

impl BarcodeDecoder for FixedCodeDecoder {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn decode(&mut self, frame: &VideoFrame) -> anyhow::Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(frame.is_well_formed().then(|| "5000".to_string()))
    }
}

#[test]
fn sampling_engine_confirms_and_goes_quiet() {
    let mut cfg = ScannerConfig::default();
    cfg.decode.sample_hz = 50;

    let camera = SyntheticCamera::new("stub://rear_camera");
    let control = camera.control();
    let observer = Arc::new(RecordingObserver::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let mut screen = CameraScreen::with_decoder(
        Box::new(camera),
        Arc::new(FrameSurface::new()),
        FixedCodeDecoder {
            calls: calls.clone(),
        },
        &cfg,
        Hooks::new(observer.clone()),
    );

    assert_eq!(screen.start_scan(), ScanState::Scanning);
    let cancel = AtomicBool::new(false);
    let state = screen.run_scan_until_settled(Duration::from_secs(5), &cancel);

    assert_eq!(state, ScanState::Stopped);
    assert_eq!(
        &screen.scanner().history()[4..],
        &[ScanState::Confirmed, ScanState::Stopped]
    );
    assert_eq!(observer.confirmed_codes(), vec!["5000"]);
    assert_eq!(control.live_tracks(), 0);

    // The sampler thread was joined before release: no further decode attempts.
    let settled_calls = calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(Ordering::SeqCst), settled_calls);
    assert_eq!(screen.pump(), ScanState::Stopped);
    assert_eq!(observer.confirmed_codes().len(), 1);
}
