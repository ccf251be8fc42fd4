use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::camera::VideoSurface;
use crate::decode::engine::{DecodeCandidate, DecodeEngine, EngineError};

/// Engine that replays a fixed list of codes on start.
///
/// Every code is queued synchronously inside `start`, in order, which models
/// a burst of callbacks arriving faster than the host drains them.
pub struct ScriptedDecodeEngine {
    codes: Vec<String>,
    init_failure: Option<String>,
    running: bool,
    starts: u32,
}

impl ScriptedDecodeEngine {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
            init_failure: None,
            running: false,
            starts: 0,
        }
    }

    /// Make every `start` fail with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self {
            init_failure: Some(reason.to_string()),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn starts(&self) -> u32 {
        self.starts
    }
}

impl DecodeEngine for ScriptedDecodeEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn start(
        &mut self,
        _surface: Arc<dyn VideoSurface>,
        candidates: Sender<DecodeCandidate>,
    ) -> Result<(), EngineError> {
        if self.running {
            return Err(EngineError::AlreadyRunning(self.name()));
        }
        if let Some(reason) = &self.init_failure {
            return Err(EngineError::Init {
                engine: self.name(),
                reason: reason.clone(),
            });
        }

        self.starts += 1;
        self.running = true;
        for code in &self.codes {
            if candidates.send(DecodeCandidate::new(code.clone())).is_err() {
                break;
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FrameSurface;
    use std::sync::mpsc;

    #[test]
    fn replays_codes_in_order() {
        let mut engine = ScriptedDecodeEngine::new(["1", "2", "3"]);
        let (tx, rx) = mpsc::channel();
        engine
            .start(Arc::new(FrameSurface::new()), tx)
            .expect("start");

        let codes: Vec<String> = rx.try_iter().map(|c| c.code).collect();
        assert_eq!(codes, vec!["1", "2", "3"]);
        assert!(engine.is_running());
    }

    #[test]
    fn failing_engine_reports_init_error() {
        let mut engine = ScriptedDecodeEngine::failing("no wasm");
        let (tx, _rx) = mpsc::channel();
        let err = engine
            .start(Arc::new(FrameSurface::new()), tx)
            .expect_err("init failure");
        assert!(matches!(err, EngineError::Init { .. }));
        assert!(!engine.is_running());
    }
}
