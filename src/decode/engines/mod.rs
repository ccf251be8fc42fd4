pub mod sampling;
pub mod scripted;

pub use sampling::SamplingDecodeEngine;
pub use scripted::ScriptedDecodeEngine;
