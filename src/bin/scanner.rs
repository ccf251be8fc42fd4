//! scanner - run a barcode scan or a still capture against the configured camera
//!
//! Configuration comes from `$SCANNER_CONFIG` and `SCANNER_*` overrides. The
//! default device is `stub://rear_camera`, which needs no hardware.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scan_kernel::{
    open_backend, BackendError, CameraBackend, CameraScreen, FrameSurface, Hooks,
    ScanState, ScannerConfig, ScriptedDecodeEngine, SyntheticCamera,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan until a code is confirmed, the timeout passes, or Ctrl-C.
    Scan {
        /// Comma-separated decode results to replay, in order.
        #[arg(long, value_delimiter = ',', required = true)]
        codes: Vec<String>,
        /// Give up after this many seconds.
        #[arg(long, env = "SCANNER_TIMEOUT_SECS", default_value_t = 10)]
        timeout_secs: u64,
        /// Make the environment-facing request fail (stub devices only).
        #[arg(long)]
        fail_environment: bool,
        /// Deny camera access entirely (stub devices only).
        #[arg(long)]
        fail_all: bool,
        /// Write a JSON report of the session here.
        #[arg(long)]
        out_json: Option<PathBuf>,
    },
    /// Take one still and write it as JPEG.
    Capture {
        /// Output file path for the JPEG.
        #[arg(long, default_value = "still.jpg")]
        out: PathBuf,
    },
}

#[derive(Serialize, Debug)]
struct ScanReport {
    device: String,
    code: Option<String>,
    state: String,
    history: Vec<String>,
    candidates_observed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = ScannerConfig::load()?;
    log::info!(
        "scanner using device {} ({}x{}), confirm {} of {}",
        cfg.camera.device,
        cfg.camera.width,
        cfg.camera.height,
        cfg.confirmation.threshold,
        cfg.confirmation.window
    );

    match args.command {
        Command::Scan {
            codes,
            timeout_secs,
            fail_environment,
            fail_all,
            out_json,
        } => {
            let backend = build_backend(&cfg, fail_environment, fail_all)?;
            run_scan(&cfg, backend, codes, Duration::from_secs(timeout_secs), out_json)
        }
        Command::Capture { out } => {
            let backend = build_backend(&cfg, false, false)?;
            run_capture(&cfg, backend, out)
        }
    }
}

fn build_backend(
    cfg: &ScannerConfig,
    fail_environment: bool,
    fail_all: bool,
) -> Result<Box<dyn CameraBackend>> {
    if !cfg.camera.device.starts_with("stub://") {
        if fail_environment || fail_all {
            return Err(anyhow!("--fail-environment/--fail-all need a stub:// device"));
        }
        return open_backend(&cfg.camera);
    }

    let camera = SyntheticCamera::new(&cfg.camera.device);
    let control = camera.control();
    if fail_all {
        control.deny_all();
    } else if fail_environment {
        control.fail_environment(BackendError::NotFound("no environment-facing camera".into()));
    }
    Ok(Box::new(camera))
}

fn run_scan(
    cfg: &ScannerConfig,
    backend: Box<dyn CameraBackend>,
    codes: Vec<String>,
    timeout: Duration,
    out_json: Option<PathBuf>,
) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let mut screen = CameraScreen::new(
        backend,
        Arc::new(FrameSurface::new()),
        Box::new(ScriptedDecodeEngine::new(codes)),
        cfg,
        Hooks::default(),
    );

    let state = match screen.start_scan() {
        ScanState::Error => ScanState::Error,
        _ => screen.run_scan_until_settled(timeout, &cancel),
    };

    let scanner = screen.scanner();
    let report = ScanReport {
        device: cfg.camera.device.clone(),
        code: scanner.result().map(|result| result.code.clone()),
        state: format!("{:?}", state),
        history: scanner.history().iter().map(|s| format!("{:?}", s)).collect(),
        candidates_observed: scanner.observed(),
    };
    screen.dispose();

    if let Some(path) = out_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        log::info!("scan report written to {}", path.display());
    }

    match (&report.code, state) {
        (Some(code), _) => {
            println!("{}", code);
            Ok(())
        }
        (None, ScanState::Error) => Err(anyhow!("scan failed; see log for the camera error")),
        (None, _) if cancel.load(Ordering::SeqCst) => {
            log::info!("scan cancelled");
            Ok(())
        }
        (None, _) => Err(anyhow!("no code confirmed within {:?}", timeout)),
    }
}

fn run_capture(cfg: &ScannerConfig, backend: Box<dyn CameraBackend>, out: PathBuf) -> Result<()> {
    let mut screen = CameraScreen::new(
        backend,
        Arc::new(FrameSurface::new()),
        Box::new(ScriptedDecodeEngine::new(Vec::<String>::new())),
        cfg,
        Hooks::default(),
    );

    screen
        .activate_capture()
        .map_err(|err| anyhow!("camera activation failed: {}", err))?;
    let image = screen
        .capture_blocking()
        .map_err(|err| anyhow!("capture failed: {}", err))?;
    let jpeg = image.jpeg_bytes()?;
    std::fs::write(&out, &jpeg).with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "{} ({}x{}, {} bytes)",
        out.display(),
        image.width,
        image.height,
        jpeg.len()
    );
    Ok(())
}
