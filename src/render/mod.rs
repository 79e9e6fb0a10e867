#[cfg(feature = "desktop")]
pub mod encode;
#[cfg(feature = "desktop")]
pub mod overlay;
pub mod skeleton;
#[cfg(feature = "desktop")]
pub mod window;

#[cfg(feature = "desktop")]
pub use encode::{encode_jpeg, Framebuffer, FramebufferRenderer, JpegRenderer};
#[cfg(feature = "desktop")]
pub use overlay::OverlayPainter;
#[cfg(feature = "desktop")]
pub use window::{PreviewWindow, WindowCommand};

use crate::pose::Detection;
use crate::tracker::{AlignmentReport, ExamMode, TargetSet};

/// Targets and their alignment for one frame
#[derive(Debug, Clone, Copy)]
pub struct Tracking<'a> {
    pub targets: &'a TargetSet,
    pub report: &'a AlignmentReport,
}

#[derive(Debug, Clone, Copy)]
pub enum OverlayState<'a> {
    /// No detector result yet
    Initializing,
    /// Detector ran but found nobody
    NoPose,
    /// A body was found; `tracking` is absent when the torso geometry was
    /// unusable or the mode changed while the frame was in flight.
    Pose {
        detection: &'a Detection,
        tracking: Option<Tracking<'a>>,
    },
}

/// Everything a renderer needs to annotate one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameOverlay<'a> {
    pub mode: ExamMode,
    pub fps: f32,
    pub state: OverlayState<'a>,
}

/// Draws the overlay onto a frame and turns it into whatever the consumers
/// of the frame buffer read (JPEG bytes, a window framebuffer, ...).
pub trait Renderer<I>: Send {
    type Output: Send + Sync + 'static;

    fn render(&mut self, image: I, overlay: &FrameOverlay<'_>) -> anyhow::Result<Self::Output>;
}
