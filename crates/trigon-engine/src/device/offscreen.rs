use std::sync::mpsc;

use winit::dpi::PhysicalSize;

use crate::render::{align_up, PresentationSurface, RendererError, RendererResult, TargetFormats};

use super::surface::DepthTarget;
use super::{GraphicsContext, SurfaceFrame};

/// Render target backed by plain textures instead of a swapchain.
///
/// Every acquire succeeds and never carries a drawable. Used for headless
/// runs and for reading rendered pixels back.
pub struct OffscreenTarget {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: DepthTarget,
    formats: TargetFormats,
    size: PhysicalSize<u32>,
}

impl OffscreenTarget {
    pub fn new(
        ctx: &GraphicsContext,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> RendererResult<Self> {
        if width == 0 || height == 0 {
            return Err(RendererError::InvalidConfig(format!(
                "offscreen target must not be empty ({width}x{height})"
            )));
        }

        let size = PhysicalSize::new(width, height);
        let color = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("OffscreenColor"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = DepthTarget::new(ctx.device(), ctx.depth_stencil_format(), size);

        Ok(Self {
            color,
            color_view,
            depth,
            formats: TargetFormats {
                color: format,
                depth_stencil: ctx.depth_stencil_format(),
                sample_count: 1,
            },
            size,
        })
    }

    pub fn target_formats(&self) -> TargetFormats {
        self.formats
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Copies the color texture to host memory, rows tightly packed.
    ///
    /// Waits for all submitted work first.
    pub fn read_pixels(&self, ctx: &GraphicsContext) -> RendererResult<Vec<u8>> {
        let bytes_per_pixel = self.formats.color.block_copy_size(None).ok_or_else(|| {
            RendererError::Readback(format!("{:?} cannot be copied", self.formats.color))
        })?;
        let row_bytes = self.size.width * bytes_per_pixel;
        let padded_row = align_up(
            row_bytes as usize,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize,
        ) as u32;

        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("OffscreenReadback"),
            size: u64::from(padded_row) * u64::from(self.size.height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Offscreen Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.size.height),
                },
            },
            wgpu::Extent3d {
                width: self.size.width,
                height: self.size.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue().submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.wait_idle();

        rx.recv()
            .map_err(|_| RendererError::Readback("map callback never ran".to_string()))?
            .map_err(|e| RendererError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity(packed_len(row_bytes, self.size.height));
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        buffer.unmap();

        Ok(pixels)
    }
}

impl PresentationSurface for OffscreenTarget {
    fn acquire_frame(&self) -> RendererResult<Option<SurfaceFrame>> {
        Ok(Some(SurfaceFrame {
            color_view: self.color_view.clone(),
            depth_view: self.depth.view().clone(),
            drawable: None,
        }))
    }
}

/// Bytes in `rows` tightly packed rows of `row_bytes` each.
fn packed_len(row_bytes: u32, rows: u32) -> usize {
    row_bytes as usize * rows as usize
}
