//! Decode engines.
//!
//! The pattern-recognition engine is external. This module defines the seam
//! (`DecodeEngine`, `BarcodeDecoder`) and two engines:
//! - `SamplingDecodeEngine`: own sampling thread over the bound surface
//! - `ScriptedDecodeEngine`: replays a fixed code list (stub devices, tests)
//!
//! Engines emit `DecodeCandidate`s into an mpsc channel; the scan session
//! owns the receiving end and drops it to cut off late deliveries.

mod engine;
mod engines;

pub use engine::{BarcodeDecoder, DecodeCandidate, DecodeEngine, EngineError};
pub use engines::{SamplingDecodeEngine, ScriptedDecodeEngine};
