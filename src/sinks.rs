//! Callback contract and outbound sinks.
//!
//! `ScanObserver` is how the host learns about outcomes. `TelemetrySink` and
//! `NoticeSink` are outbound collaborators. Sink failures are logged and
//! dropped: they MUST NOT block or alter the camera lifecycle.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::capture::CapturedImage;
use crate::error::{CameraError, ErrorKind};

/// Inbound callbacks fired by the pipeline.
///
/// Every callback fires after the camera has been released, except
/// `on_error(CameraNotReady, ..)`, which leaves the camera live for a manual retry.
pub trait ScanObserver: Send + Sync {
    /// Fired exactly once per successful scan session.
    fn on_scan_confirmed(&self, code: &str);

    /// Fired once per successful still capture.
    fn on_capture_complete(&self, image: &CapturedImage);

    /// Fired once per failure.
    fn on_error(&self, kind: ErrorKind, message: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Structured event sink, `(event_name, attributes)`.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &str, attributes: &[(&str, String)]) -> Result<()>;
}

/// User-facing notice sink, `(title, description, severity)`.
pub trait NoticeSink: Send + Sync {
    fn notify(&self, title: &str, description: &str, severity: Severity) -> Result<()>;
}

/// Telemetry written through the `log` facade at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn record(&self, event: &str, attributes: &[(&str, String)]) -> Result<()> {
        let rendered: Vec<String> = attributes
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        log::debug!("telemetry {} {}", event, rendered.join(" "));
        Ok(())
    }
}

/// Notices written through the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotices;

impl NoticeSink for LogNotices {
    fn notify(&self, title: &str, description: &str, severity: Severity) -> Result<()> {
        match severity {
            Severity::Info => log::info!("{}: {}", title, description),
            Severity::Warning => log::warn!("{}: {}", title, description),
            Severity::Error => log::error!("{}: {}", title, description),
        }
        Ok(())
    }
}

/// Observer that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn on_scan_confirmed(&self, code: &str) {
        log::info!("scan confirmed: {}", code);
    }

    fn on_capture_complete(&self, image: &CapturedImage) {
        log::info!("capture complete: {}x{}", image.width, image.height);
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        log::error!("{}: {}", kind, message);
    }
}

/// An observed callback, as collected by `RecordingObserver`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observed {
    ScanConfirmed(String),
    CaptureComplete(CapturedImage),
    Error(ErrorKind, String),
}

/// Observer that keeps every callback in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observed> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn confirmed_codes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Observed::ScanConfirmed(code) => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Observed::Error(kind, message) => Some((kind, message)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Observed) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl ScanObserver for RecordingObserver {
    fn on_scan_confirmed(&self, code: &str) {
        self.push(Observed::ScanConfirmed(code.to_string()));
    }

    fn on_capture_complete(&self, image: &CapturedImage) {
        self.push(Observed::CaptureComplete(image.clone()));
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.push(Observed::Error(kind, message.to_string()));
    }
}

/// The observer plus both outbound sinks, shared by every pipeline component.
#[derive(Clone)]
pub struct Hooks {
    observer: Arc<dyn ScanObserver>,
    telemetry: Arc<dyn TelemetrySink>,
    notices: Arc<dyn NoticeSink>,
}

impl Hooks {
    /// Hooks with log-backed telemetry and notices.
    pub fn new(observer: Arc<dyn ScanObserver>) -> Self {
        Self {
            observer,
            telemetry: Arc::new(LogTelemetry),
            notices: Arc::new(LogNotices),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_notices(mut self, notices: Arc<dyn NoticeSink>) -> Self {
        self.notices = notices;
        self
    }

    pub fn observer(&self) -> &Arc<dyn ScanObserver> {
        &self.observer
    }

    pub(crate) fn record(&self, event: &str, attributes: &[(&str, String)]) {
        if let Err(err) = self.telemetry.record(event, attributes) {
            log::warn!("telemetry sink rejected {}: {}", event, err);
        }
    }

    /// Notify the user and fire `on_error`. The caller has already released
    /// the camera when the error is terminal.
    pub(crate) fn report_error(&self, err: &CameraError) {
        let kind = err.kind();
        let message = err.to_string();
        self.record(
            "camera.error",
            &[("kind", kind.to_string()), ("message", message.clone())],
        );
        let (title, description, severity) = kind.notice();
        if let Err(sink_err) = self.notices.notify(title, description, severity) {
            log::warn!("notice sink rejected {}: {}", kind, sink_err);
        }
        self.observer.on_error(kind, &message);
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new(Arc::new(LogObserver))
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}
