use super::error::{RendererError, RendererResult};
use super::pipeline::uniforms_binding_size;
use super::ring::{SlotHandle, UniformRingBuffer};
use super::types::{BufferIndex, Uniforms};

/// Device-side backing of the uniform ring: one buffer holding every slot and
/// a bind group addressed with a per-frame dynamic offset.
pub struct UniformBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformBinding {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        ring: &UniformRingBuffer<Uniforms>,
    ) -> RendererResult<Self> {
        let size = ring.byte_len() as u64;
        let limit = device.limits().max_buffer_size;
        if size > limit {
            return Err(RendererError::BufferAllocation(format!(
                "uniform ring needs {size} bytes, device allows {limit}"
            )));
        }

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("UniformBuffer"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("UniformBindGroup"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: BufferIndex::Uniforms.slot(),
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: uniforms_binding_size(),
                }),
            }],
        });

        log::debug!(
            "uniform ring: {} slots x {} bytes",
            ring.slot_count(),
            ring.stride()
        );

        Ok(Self { buffer, bind_group })
    }

    /// Copies the slot's record into its region of the device buffer.
    pub fn upload(&self, queue: &wgpu::Queue, ring: &UniformRingBuffer<Uniforms>, slot: &SlotHandle) {
        queue.write_buffer(&self.buffer, slot.offset(), ring.slot_bytes(slot));
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Dynamic offset that selects `slot` inside the bind group.
    #[inline]
    pub fn dynamic_offset(slot: &SlotHandle) -> wgpu::DynamicOffset {
        slot.offset() as wgpu::DynamicOffset
    }
}
