use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::camera::VideoSurface;
use crate::config::DecodeSettings;
use crate::decode::engine::{BarcodeDecoder, DecodeCandidate, DecodeEngine, EngineError};

/// Engine that samples the bound surface on its own thread.
///
/// Every `1 / sample_hz` seconds the loop renders the current frame and runs
/// the decoder on it; each decoded code is sent as one candidate. Frames that
/// are not ready yet are skipped.
pub struct SamplingDecodeEngine<D: BarcodeDecoder + 'static> {
    decoder: Arc<Mutex<D>>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl<D: BarcodeDecoder + 'static> SamplingDecodeEngine<D> {
    pub fn new(decoder: D, sample_hz: u32) -> Self {
        let interval = Duration::from_millis(1000 / u64::from(sample_hz.max(1)));
        Self {
            decoder: Arc::new(Mutex::new(decoder)),
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            join: None,
        }
    }

    pub fn from_settings(decoder: D, settings: &DecodeSettings) -> Self {
        Self::new(decoder, settings.sample_hz)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<D: BarcodeDecoder + 'static> DecodeEngine for SamplingDecodeEngine<D> {
    fn name(&self) -> &'static str {
        "sampling"
    }

    fn start(
        &mut self,
        surface: Arc<dyn VideoSurface>,
        candidates: Sender<DecodeCandidate>,
    ) -> Result<(), EngineError> {
        if self.join.is_some() {
            return Err(EngineError::AlreadyRunning(self.name()));
        }

        {
            let mut decoder = self.decoder.lock().map_err(|_| EngineError::Init {
                engine: "sampling",
                reason: "decoder lock poisoned".into(),
            })?;
            decoder.warm_up().map_err(|err| EngineError::Init {
                engine: "sampling",
                reason: format!("{} warm-up failed: {}", decoder.name(), err),
            })?;
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        self.shutdown = shutdown.clone();
        let decoder = self.decoder.clone();
        let interval = self.interval;
        let join = std::thread::Builder::new()
            .name("decode-sampler".into())
            .spawn(move || run_sampler(surface, decoder, candidates, shutdown, interval))
            .map_err(|err| EngineError::Init {
                engine: "sampling",
                reason: format!("spawn sampler thread: {}", err),
            })?;
        self.join = Some(join);
        Ok(())
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("SamplingDecodeEngine: sampler thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.join.is_some()
    }
}

impl<D: BarcodeDecoder + 'static> Drop for SamplingDecodeEngine<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_sampler<D: BarcodeDecoder>(
    surface: Arc<dyn VideoSurface>,
    decoder: Arc<Mutex<D>>,
    candidates: Sender<DecodeCandidate>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) {
    let mut attempts = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        if surface.ready_state().has_enough_data() {
            attempts += 1;
            match sample_once(surface.as_ref(), &decoder) {
                Ok(Some(code)) => {
                    // Checked again so nothing is sent after stop() was requested.
                    if shutdown.load(Ordering::SeqCst)
                        || candidates.send(DecodeCandidate::new(code)).is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => log::debug!("SamplingDecodeEngine: attempt {} failed: {}", attempts, err),
            }
        }
        std::thread::sleep(interval);
    }
    log::debug!("SamplingDecodeEngine: sampler exiting after {} attempts", attempts);
}

fn sample_once<D: BarcodeDecoder>(
    surface: &dyn VideoSurface,
    decoder: &Mutex<D>,
) -> anyhow::Result<Option<String>> {
    let frame = surface.render_frame()?;
    let mut decoder = decoder
        .lock()
        .map_err(|_| anyhow::anyhow!("decoder lock poisoned"))?;
    decoder.decode(&frame)
}
