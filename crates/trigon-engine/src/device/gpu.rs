use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::render::{PresentationSurface, RendererError, RendererResult, TargetFormats};

use super::surface::{self, DepthTarget};
use super::{GpuInit, GraphicsContext, SurfaceErrorAction, SurfaceFrame};

/// Window-bound GPU state: the shared [`GraphicsContext`] plus the swapchain
/// and a depth/stencil attachment matching its size.
pub struct Gpu<'w> {
    /// Kept alive for the surface.
    _instance: wgpu::Instance,

    /// Surface bound to the window.
    surface: wgpu::Surface<'w>,

    context: GraphicsContext,

    /// Active surface configuration.
    config: wgpu::SurfaceConfiguration,

    depth: DepthTarget,

    /// Current drawable size in physical pixels.
    size: PhysicalSize<u32>,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: &GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RendererError::DeviceUnavailable(e.to_string()))?;

        let context = GraphicsContext::create(&adapter, init).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&surface_caps, init.prefer_srgb)
            .context("no supported surface formats")?;

        let alpha_mode = surface::choose_alpha_mode(&surface_caps, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };

        surface.configure(context.device(), &config);
        log::info!(
            "surface configured: {format:?} {}x{} {:?}",
            size.width,
            size.height,
            init.present_mode
        );

        let depth = DepthTarget::new(context.device(), context.depth_stencil_format(), size);

        Ok(Self {
            _instance: instance,
            surface,
            context,
            config,
            depth,
            size,
        })
    }

    pub fn context(&self) -> &GraphicsContext {
        &self.context
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Formats a pipeline must be built with to draw into this window.
    pub fn target_formats(&self) -> TargetFormats {
        TargetFormats {
            color: self.config.format,
            depth_stencil: self.context.depth_stencil_format(),
            sample_count: 1,
        }
    }

    /// Returns the current drawable size (physical pixels).
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Reconfigures the surface and rebuilds the depth attachment.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let configured = surface::apply_resize(
            &self.surface,
            self.context.device(),
            &mut self.config,
            &mut self.size,
            new_size,
        );

        if configured {
            self.depth = DepthTarget::new(
                self.context.device(),
                self.context.depth_stencil_format(),
                new_size,
            );
        }
    }
}

impl PresentationSurface for Gpu<'_> {
    fn acquire_frame(&self) -> RendererResult<Option<SurfaceFrame>> {
        // Minimized.
        if self.size.width == 0 || self.size.height == 0 {
            return Ok(None);
        }

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                let action = surface::map_surface_error(
                    &self.surface,
                    self.context.device(),
                    &self.config,
                    self.size,
                    err,
                );
                return match action {
                    SurfaceErrorAction::Fatal => Err(RendererError::SurfaceFatal),
                    action => {
                        log::debug!("no drawable this frame ({action:?})");
                        Ok(None)
                    }
                };
            }
        };

        let color_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Some(SurfaceFrame {
            color_view,
            depth_view: self.depth.view().clone(),
            drawable: Some(surface_texture),
        }))
    }
}
