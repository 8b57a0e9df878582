/// Attachments for one frame, handed out by a
/// [`PresentationSurface`](crate::render::PresentationSurface).
///
/// Short-lived: holding the drawable blocks acquisition of later frames, so
/// the renderer moves it into the command buffer and lets go of the rest when
/// the frame is encoded.
pub struct SurfaceFrame {
    pub color_view: wgpu::TextureView,
    pub depth_view: wgpu::TextureView,
    /// Swapchain image to present; `None` for offscreen targets.
    pub drawable: Option<wgpu::SurfaceTexture>,
}
