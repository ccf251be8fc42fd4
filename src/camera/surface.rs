use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::backend::{FrameSource, VideoSurface};
use crate::error::BackendError;
use crate::frame::{ReadyState, VideoFrame};

/// Headless `VideoSurface` that forwards to the attached frame source.
#[derive(Default)]
pub struct FrameSurface {
    source: Mutex<Option<Arc<dyn FrameSource>>>,
    muted: AtomicBool,
}

impl FrameSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Option<Arc<dyn FrameSource>> {
        match self.source.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl VideoSurface for FrameSurface {
    fn attach(&self, source: Arc<dyn FrameSource>) {
        match self.source.lock() {
            Ok(mut guard) => *guard = Some(source),
            Err(poisoned) => *poisoned.into_inner() = Some(source),
        }
    }

    fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    fn detach(&self) {
        match self.source.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn is_attached(&self) -> bool {
        self.current().is_some()
    }

    fn ready_state(&self) -> ReadyState {
        self.current()
            .map(|source| source.ready_state())
            .unwrap_or(ReadyState::Nothing)
    }

    fn dimensions(&self) -> (u32, u32) {
        self.current()
            .map(|source| source.dimensions())
            .unwrap_or((0, 0))
    }

    fn render_frame(&self) -> Result<VideoFrame, BackendError> {
        let source = self
            .current()
            .ok_or_else(|| BackendError::Device("surface has no stream attached".into()))?;
        source.read_frame()
    }
}

impl std::fmt::Debug for FrameSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSurface")
            .field("attached", &self.is_attached())
            .field("muted", &self.is_muted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SolidSource;

    impl FrameSource for SolidSource {
        fn dimensions(&self) -> (u32, u32) {
            (2, 1)
        }

        fn ready_state(&self) -> ReadyState {
            ReadyState::EnoughData
        }

        fn read_frame(&self) -> Result<VideoFrame, BackendError> {
            Ok(VideoFrame::new(2, 1, vec![9u8; 8]))
        }
    }

    #[test]
    fn detached_surface_reports_nothing() {
        let surface = FrameSurface::new();
        assert_eq!(surface.ready_state(), ReadyState::Nothing);
        assert_eq!(surface.dimensions(), (0, 0));
        assert!(surface.render_frame().is_err());
    }

    #[test]
    fn attached_surface_forwards_to_source() {
        let surface = FrameSurface::new();
        surface.attach(Arc::new(SolidSource));
        assert_eq!(surface.ready_state(), ReadyState::EnoughData);
        assert_eq!(surface.dimensions(), (2, 1));
        assert_eq!(surface.render_frame().map(|f| f.rgba.len()), Ok(8));

        surface.detach();
        surface.detach();
        assert!(!surface.is_attached());
    }
}
