//! Scan Kernel
//!
//! Camera capture and barcode confirmation core for one camera screen.
//!
//! # Architecture
//!
//! The kernel keeps four guarantees by construction:
//!
//! 1. **One owner**: every camera stream is acquired and released through `MediaResourceGuard`.
//! 2. **Always released**: success, error, reset and disposal all stop every track.
//! 3. **Confirmed codes only**: a code is reported after it wins a majority of recent reads.
//! 4. **Single acceptance**: one confirmed code per scan session, late reads are dropped.
//!
//! # Module Structure
//!
//! - `camera`: hardware seam, the guard, synthetic and V4L2 backends
//! - `capture`: single-flight still capture to a JPEG data URI
//! - `confirm`: sliding-window majority filter
//! - `decode`: decode engine seam and engines
//! - `session`: the scan state machine
//! - `screen`: guard plus both consumers for one screen
//! - `sinks`: observer callbacks, telemetry and notices
//! - `config`: file and environment configuration

pub mod camera;
pub mod capture;
pub mod config;
pub mod confirm;
pub mod decode;
pub mod error;
pub mod frame;
pub mod screen;
pub mod session;
pub mod sinks;

pub use camera::{
    open_backend, Binding, CameraBackend, FrameSurface, MediaResourceGuard, MediaSession,
    StreamOrigin, SyntheticCamera, SyntheticControl, VideoSurface,
};
pub use capture::{CaptureOutcome, CapturedImage, StillCaptureController};
pub use config::{
    CameraSettings, CaptureSettings, ConfirmationSettings, DecodeSettings, ScannerConfig,
};
pub use confirm::{ConfirmationWindow, ScanConfirmationFilter, ScanResult};
pub use decode::{
    BarcodeDecoder, DecodeCandidate, DecodeEngine, SamplingDecodeEngine, ScriptedDecodeEngine,
};
pub use error::{BackendError, CameraError, ErrorKind};
pub use frame::{ReadyState, VideoFrame};
pub use screen::CameraScreen;
pub use session::{BarcodeScanSession, ScanState};
pub use sinks::{Hooks, NoticeSink, RecordingObserver, ScanObserver, Severity, TelemetrySink};
