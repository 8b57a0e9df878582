use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::render::{RendererError, RendererResult};

use super::{surface, GpuInit};

type CompletedHandler = Box<dyn FnOnce() + Send + 'static>;

/// Commands for one frame plus what must happen when they are committed.
///
/// Created by [`GraphicsContext::begin_frame`]; consumed by
/// [`GraphicsContext::commit`].
pub struct CommandBuffer {
    encoder: wgpu::CommandEncoder,
    completed: Vec<CompletedHandler>,
    drawable: Option<wgpu::SurfaceTexture>,
}

impl CommandBuffer {
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }

    /// Registers `handler` to run once the GPU has finished this buffer.
    ///
    /// The handler may run on any thread that maintains the device.
    pub fn add_completed_handler(&mut self, handler: impl FnOnce() + Send + 'static) {
        self.completed.push(Box::new(handler));
    }

    /// Schedules `drawable` for presentation right after submission.
    pub fn present(&mut self, drawable: wgpu::SurfaceTexture) {
        if self.drawable.replace(drawable).is_some() {
            log::warn!("command buffer already had a drawable; the previous one is discarded");
        }
    }

    pub fn has_drawable(&self) -> bool {
        self.drawable.is_some()
    }
}

/// Device and submission queue shared by every renderer object.
///
/// Does not own a surface: windowed rendering goes through
/// [`Gpu`](super::Gpu), offscreen rendering through
/// [`OffscreenTarget`](super::OffscreenTarget).
pub struct GraphicsContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    depth_stencil_format: wgpu::TextureFormat,
    lost: Arc<AtomicBool>,
}

impl GraphicsContext {
    /// Opens the device and queue on `adapter`.
    pub async fn create(adapter: &wgpu::Adapter, init: &GpuInit) -> RendererResult<Self> {
        let info = adapter.get_info();
        log::info!("adapter: {} ({:?})", info.name, info.backend);

        let depth_stencil_format = surface::choose_depth_format(adapter.features());
        let mut required_features = init.required_features;
        if depth_stencil_format == wgpu::TextureFormat::Depth32FloatStencil8 {
            required_features |= wgpu::Features::DEPTH32FLOAT_STENCIL8;
        } else {
            log::warn!(
                "adapter lacks Depth32FloatStencil8; using {depth_stencil_format:?}"
            );
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("trigon device"),
                required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RendererError::QueueCreation(e.to_string()))?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            flag.store(true, Ordering::Release);
            match reason {
                wgpu::DeviceLostReason::Destroyed => log::debug!("device destroyed: {message}"),
                _ => log::error!("device lost ({reason:?}): {message}"),
            }
        });

        Ok(Self {
            device,
            queue,
            depth_stencil_format,
            lost,
        })
    }

    /// Opens a device on the preferred adapter without any surface.
    pub async fn headless(init: &GpuInit) -> RendererResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RendererError::DeviceUnavailable(e.to_string()))?;

        Self::create(&adapter, init).await
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Depth/stencil format every attachment of this device uses.
    pub fn depth_stencil_format(&self) -> wgpu::TextureFormat {
        self.depth_stencil_format
    }

    /// Smallest legal distance between two dynamic uniform offsets.
    pub fn min_uniform_alignment(&self) -> usize {
        self.device.limits().min_uniform_buffer_offset_alignment as usize
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub fn begin_frame(&self, label: &str) -> CommandBuffer {
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });

        CommandBuffer {
            encoder,
            completed: Vec::new(),
            drawable: None,
        }
    }

    /// Submits `cmd`, registers its completion handlers and presents its
    /// drawable, in that order.
    pub fn commit(&self, cmd: CommandBuffer) -> wgpu::SubmissionIndex {
        let CommandBuffer {
            encoder,
            completed,
            drawable,
        } = cmd;

        let index = self.queue.submit(std::iter::once(encoder.finish()));

        // Handlers attach to the most recent submission.
        for handler in completed {
            self.queue.on_submitted_work_done(handler);
        }

        if let Some(drawable) = drawable {
            drawable.present();
        }

        index
    }

    /// Non-blocking maintenance; fires handlers of finished submissions.
    pub fn poll(&self) {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
    }

    /// Blocks until `index` has finished and its handlers have run.
    pub fn wait_for(&self, index: wgpu::SubmissionIndex) {
        let wait = wgpu::PollType::Wait {
            submission_index: Some(index),
            timeout: None,
        };
        if let Err(e) = self.device.poll(wait) {
            log::warn!("waiting for submission failed: {e}");
        }
    }

    /// Blocks until every submission so far has finished.
    pub fn wait_idle(&self) {
        let wait = wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        };
        if let Err(e) = self.device.poll(wait) {
            log::warn!("waiting for device idle failed: {e}");
        }
    }
}
