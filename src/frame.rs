//! Frames rendered from a video surface.
//!
//! - `VideoFrame`: one RGBA8 frame pulled off a bound surface.
//! - `ReadyState`: the surface readiness ladder used by capture and scanning.

/// Readiness of a video surface, ordered from "nothing known" to "playing".
///
/// `Metadata` means the stream dimensions are known. Still capture requires
/// `EnoughData`, i.e. a decoded frame is available to render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyState {
    #[default]
    Nothing,
    Metadata,
    CurrentData,
    FutureData,
    EnoughData,
}

impl ReadyState {
    pub fn has_metadata(self) -> bool {
        self >= ReadyState::Metadata
    }

    pub fn has_enough_data(self) -> bool {
        self >= ReadyState::EnoughData
    }
}

/// One decoded frame, RGBA8, row-major, no stride padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }

    /// Expected buffer length for the frame dimensions, or `None` on overflow.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|px| px.checked_mul(4))
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.expected_len() == Some(self.rgba.len())
    }
}
