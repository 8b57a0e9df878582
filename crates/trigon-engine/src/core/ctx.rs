use winit::window::Window;

use crate::device::Gpu;
use crate::render::{FrameOutcome, FrameRenderer, RendererError};

use super::app::AppControl;

/// Per-frame context passed to `core::App::on_frame`.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by `Gpu<'w>`
pub struct FrameCtx<'a, 'w> {
    pub window: &'a Window,
    pub gpu: &'a Gpu<'w>,
}

impl FrameCtx<'_, '_> {
    /// Draws one frame with `renderer` into the window surface.
    ///
    /// Skipped frames are not errors. `SurfaceFatal` and `DeviceLost` end
    /// the run.
    pub fn draw(&self, renderer: &mut FrameRenderer) -> AppControl {
        self.window.pre_present_notify();

        match renderer.draw(self.gpu.context(), self.gpu) {
            Ok(report) => {
                if report.outcome == FrameOutcome::Skipped {
                    log::debug!("frame {} skipped", report.frame_index);
                }
                AppControl::Continue
            }
            Err(err @ (RendererError::SurfaceFatal | RendererError::DeviceLost)) => {
                log::error!("rendering stopped: {err}");
                AppControl::Exit
            }
            Err(err) => {
                log::warn!("frame failed: {err}");
                AppControl::Continue
            }
        }
    }
}
