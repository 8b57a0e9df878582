//! Per-frame orchestration: slot acquisition, uniform update, encode,
//! submit and present.

use crate::device::{CommandBuffer, GraphicsContext};

use super::error::{RendererError, RendererResult};
use super::geometry::{GeometryBuffers, StaticGeometryStore, TriangleMesh};
use super::pipeline::{PipelineBuilder, PipelineState, VertexLayout};
use super::ring::{SlotHandle, UniformRingBuffer};
use super::shader::ShaderLibrary;
use super::target::PresentationSurface;
use super::types::{BufferIndex, TargetFormats, Uniforms, UNIFORM_ALIGNMENT, UNIFORM_BIND_GROUP};
use super::uniforms::UniformBinding;

/// Upper bound for [`RendererConfig::max_buffers_in_flight`].
pub const MAX_BUFFERS_IN_FLIGHT: usize = 8;

const FRAME_ENCODER_LABEL: &str = "Primary Render Encoder";
const RENDER_PASS_LABEL: &str = "Triangle Pass";
const DRAW_DEBUG_GROUP: &str = "Draw Triangle";

/// How far the CPU may run ahead of the GPU.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubmissionMode {
    /// Return right after submission; up to N frames overlap.
    Overlapped,
    /// Wait for the GPU to finish each frame before returning.
    Blocking,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RendererConfig {
    /// Ring size N.
    pub max_buffers_in_flight: usize,
    pub submission: SubmissionMode,
    pub clear_color: wgpu::Color,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_buffers_in_flight: 3,
            submission: SubmissionMode::Overlapped,
            clear_color: wgpu::Color::BLACK,
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> RendererResult<()> {
        let n = self.max_buffers_in_flight;
        if !(1..=MAX_BUFFERS_IN_FLIGHT).contains(&n) {
            return Err(RendererError::InvalidConfig(format!(
                "max_buffers_in_flight must be in 1..={MAX_BUFFERS_IN_FLIGHT}, got {n}"
            )));
        }
        Ok(())
    }
}

/// What the uniform source sees for the frame being built.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameInfo {
    pub frame_index: u64,
    pub slot: usize,
    pub width: u32,
    pub height: u32,
}

impl FrameInfo {
    /// Width over height of the last reported drawable size; 1.0 until known.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Produces the uniform record written into each frame's slot.
pub trait UniformSource: Send {
    fn uniforms(&mut self, frame: &FrameInfo) -> Uniforms;
}

/// Constant half-size scale, identical every frame.
#[derive(Debug, Default, Copy, Clone)]
pub struct FixedScale;

impl UniformSource for FixedScale {
    fn uniforms(&mut self, _frame: &FrameInfo) -> Uniforms {
        Uniforms::half_scale()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOutcome {
    /// Drawn and queued for presentation.
    Presented,
    /// Drawn into a target without a presentable image.
    Rendered,
    /// No render target this frame; the empty command buffer was still committed.
    Skipped,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub slot: usize,
    pub outcome: FrameOutcome,
}

/// Draws the triangle once per call, keeping up to N frames in flight.
pub struct FrameRenderer {
    config: RendererConfig,
    pipeline: PipelineState,
    geometry: GeometryBuffers,
    ring: UniformRingBuffer<Uniforms>,
    binding: UniformBinding,
    source: Box<dyn UniformSource>,

    /// Submission that last used each slot.
    pending: Vec<Option<wgpu::SubmissionIndex>>,
    last_submission: Option<wgpu::SubmissionIndex>,

    frame_index: u64,
    size: (u32, u32),
}

impl FrameRenderer {
    /// Builds pipeline, geometry and uniform ring. Nothing is kept on failure.
    pub fn new(
        ctx: &GraphicsContext,
        formats: TargetFormats,
        config: RendererConfig,
    ) -> RendererResult<Self> {
        config.validate()?;

        let missing = formats
            .depth_stencil
            .required_features()
            .difference(ctx.device().features());
        if !missing.is_empty() {
            return Err(RendererError::BadDepthState(format!(
                "{:?} needs device features {missing:?}",
                formats.depth_stencil
            )));
        }

        let pipeline = PipelineBuilder::new(ctx.device()).build(
            &VertexLayout::triangle(),
            &ShaderLibrary::triangle()?,
            formats,
        )?;

        let geometry = StaticGeometryStore::upload(ctx.device(), &TriangleMesh::default());

        let alignment = UNIFORM_ALIGNMENT.max(ctx.min_uniform_alignment());
        let ring = UniformRingBuffer::with_alignment(config.max_buffers_in_flight, alignment)?;
        let binding = UniformBinding::new(ctx.device(), &pipeline.uniform_layout, &ring)?;

        log::info!(
            "frame renderer ready: {} buffers in flight, {:?} submission",
            config.max_buffers_in_flight,
            config.submission
        );

        Ok(Self {
            pending: (0..config.max_buffers_in_flight).map(|_| None).collect(),
            config,
            pipeline,
            geometry,
            ring,
            binding,
            source: Box::new(FixedScale),
            last_submission: None,
            frame_index: 0,
            size: (0, 0),
        })
    }

    /// Replaces the per-frame uniform source.
    pub fn with_uniform_source(mut self, source: impl UniformSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    pub fn geometry(&self) -> &GeometryBuffers {
        &self.geometry
    }

    pub fn ring(&self) -> &UniformRingBuffer<Uniforms> {
        &self.ring
    }

    /// Number of frames drawn so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Records the new drawable size. Only the aspect ratio handed to the
    /// uniform source changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        log::debug!("renderer resize: {width}x{height}");
        self.size = (width, height);
    }

    /// Encodes, submits and presents one frame.
    pub fn draw(
        &mut self,
        ctx: &GraphicsContext,
        surface: &impl PresentationSurface,
    ) -> RendererResult<FrameReport> {
        if ctx.is_lost() {
            return Err(RendererError::DeviceLost);
        }
        ctx.poll();

        let handle = self.acquire_slot(ctx);
        let slot = handle.slot();
        let frame_index = self.frame_index;
        self.frame_index += 1;

        let mut cmd = ctx.begin_frame(FRAME_ENCODER_LABEL);

        let info = FrameInfo {
            frame_index,
            slot,
            width: self.size.0,
            height: self.size.1,
        };
        let uniforms = self.source.uniforms(&info);
        self.ring.write(&handle, &uniforms);
        self.binding.upload(ctx.queue(), &self.ring, &handle);
        let offset = UniformBinding::dynamic_offset(&handle);

        let completion = self.ring.submit(handle);
        cmd.add_completed_handler(move || completion.complete());

        let frame = match surface.acquire_frame() {
            Ok(frame) => frame,
            Err(err) => {
                // Commit anyway so the slot comes back.
                self.commit(ctx, cmd, slot);
                return Err(err);
            }
        };

        let outcome = match frame {
            None => {
                log::debug!("frame {frame_index}: no render target, skipping draw");
                FrameOutcome::Skipped
            }
            Some(frame) => {
                self.encode(&mut cmd, &frame.color_view, &frame.depth_view, offset);
                match frame.drawable {
                    Some(drawable) => {
                        cmd.present(drawable);
                        FrameOutcome::Presented
                    }
                    None => FrameOutcome::Rendered,
                }
            }
        };

        self.commit(ctx, cmd, slot);
        log::trace!("frame {frame_index} committed on slot {slot} ({outcome:?})");

        Ok(FrameReport {
            frame_index,
            slot,
            outcome,
        })
    }

    /// Blocks until every submitted frame has completed and all slots are free.
    pub fn wait_idle(&mut self, ctx: &GraphicsContext) {
        if let Some(index) = self.last_submission.take() {
            ctx.wait_for(index);
        }
        self.pending.iter_mut().for_each(|p| *p = None);
        if !ctx.is_lost() {
            self.ring.wait_idle();
        }
    }

    fn acquire_slot(&mut self, ctx: &GraphicsContext) -> SlotHandle {
        if let Some(handle) = self.ring.try_acquire() {
            return handle;
        }

        // The slot's completion is only delivered while the device is
        // maintained; wait on exactly that submission.
        let next = self.ring.next_slot();
        if let Some(index) = self.pending[next].take() {
            log::trace!("slot {next} still in flight; waiting for its submission");
            ctx.wait_for(index);
        }
        self.ring.acquire()
    }

    fn commit(&mut self, ctx: &GraphicsContext, cmd: CommandBuffer, slot: usize) {
        let index = ctx.commit(cmd);
        self.last_submission = Some(index.clone());

        match self.config.submission {
            SubmissionMode::Overlapped => self.pending[slot] = Some(index),
            SubmissionMode::Blocking => {
                ctx.wait_for(index);
                if !ctx.is_lost() {
                    self.ring.wait_idle();
                }
            }
        }
    }

    fn encode(
        &self,
        cmd: &mut CommandBuffer,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        uniform_offset: wgpu::DynamicOffset,
    ) {
        let stencil_ops = self.pipeline.depth.has_stencil().then_some(wgpu::Operations {
            load: wgpu::LoadOp::Clear(0),
            store: wgpu::StoreOp::Store,
        });

        let mut rpass = cmd.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(RENDER_PASS_LABEL),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.config.clear_color),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let draw = self.geometry.draw_call();

        rpass.push_debug_group(DRAW_DEBUG_GROUP);
        rpass.set_pipeline(&self.pipeline.pipeline);
        rpass.set_bind_group(UNIFORM_BIND_GROUP, self.binding.bind_group(), &[uniform_offset]);
        rpass.set_vertex_buffer(
            BufferIndex::MeshPositions.slot(),
            self.geometry.positions.slice(..),
        );
        rpass.set_vertex_buffer(BufferIndex::MeshColors.slot(), self.geometry.colors.slice(..));
        rpass.set_index_buffer(self.geometry.indices.slice(..), draw.index_format);
        rpass.draw_indexed(0..draw.index_count, 0, 0..1);
        rpass.pop_debug_group();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_labels_are_distinct() {
        let labels = [FRAME_ENCODER_LABEL, RENDER_PASS_LABEL, DRAW_DEBUG_GROUP];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn default_config_is_triple_buffered_and_overlapped() {
        let config = RendererConfig::default();
        assert_eq!(config.max_buffers_in_flight, 3);
        assert_eq!(config.submission, SubmissionMode::Overlapped);
        assert_eq!(config.clear_color, wgpu::Color::BLACK);
        config.validate().unwrap();
    }

    #[test]
    fn ring_size_must_be_in_range() {
        for n in [0, MAX_BUFFERS_IN_FLIGHT + 1] {
            let config = RendererConfig {
                max_buffers_in_flight: n,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(RendererError::InvalidConfig(_))));
        }

        let single = RendererConfig {
            max_buffers_in_flight: 1,
            submission: SubmissionMode::Blocking,
            ..Default::default()
        };
        single.validate().unwrap();
    }

    #[test]
    fn fixed_scale_is_exact_every_frame() {
        let expected = bytemuck::bytes_of(&Uniforms::half_scale()).to_vec();
        let mut source = FixedScale;
        for frame_index in 0..10 {
            let info = FrameInfo {
                frame_index,
                slot: (frame_index % 3) as usize,
                width: 800,
                height: 600,
            };
            let uniforms = source.uniforms(&info);
            assert_eq!(bytemuck::bytes_of(&uniforms), expected.as_slice());
        }
    }

    #[test]
    fn aspect_defaults_to_square_until_sized() {
        let mut info = FrameInfo {
            frame_index: 0,
            slot: 0,
            width: 0,
            height: 0,
        };
        assert_eq!(info.aspect(), 1.0);
        info.width = 1600;
        info.height = 800;
        assert_eq!(info.aspect(), 2.0);
    }
}
