use crate::device::SurfaceFrame;

use super::error::RendererResult;

/// Source of per-frame render targets, owned by the host.
///
/// `Ok(None)` means there is nothing to draw into this frame (minimized
/// window, transient swapchain error). The renderer skips the draw without
/// treating it as a failure. `Err` is reserved for unrecoverable surface
/// failures.
pub trait PresentationSurface {
    fn acquire_frame(&self) -> RendererResult<Option<SurfaceFrame>>;
}
