use anyhow::Result;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::camera::VideoSurface;
use crate::frame::VideoFrame;

/// One raw, unverified reading from a decode engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeCandidate {
    pub code: String,
    pub observed_at: Instant,
}

impl DecodeCandidate {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            observed_at: Instant::now(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine {engine} failed to initialise: {reason}")]
    Init { engine: &'static str, reason: String },
    #[error("engine {0} is already running")]
    AlreadyRunning(&'static str),
}

/// Decode engine contract.
///
/// `start` begins emitting candidates into `candidates` from the engine's own
/// sampling loop; the session never polls the engine. `stop` MUST be
/// synchronous: once it returns, no further candidate is sent.
pub trait DecodeEngine: Send {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    fn start(
        &mut self,
        surface: Arc<dyn VideoSurface>,
        candidates: Sender<DecodeCandidate>,
    ) -> Result<(), EngineError>;

    /// Stop emitting. Must tolerate repeated calls.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Frame-level barcode recogniser used by `SamplingDecodeEngine`.
///
/// # Audit Boundary
///
/// Implementations receive each frame by reference and MUST NOT keep it
/// beyond the `decode` call.
pub trait BarcodeDecoder: Send {
    /// Decoder identifier.
    fn name(&self) -> &'static str;

    /// Attempt to read one code from a frame. `Ok(None)` when nothing was found.
    fn decode(&mut self, frame: &VideoFrame) -> Result<Option<String>>;

    /// Optional warm-up hook, run once per engine start.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
