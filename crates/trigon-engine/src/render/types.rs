//! Types shared between CPU-side bindings and the shader program.
//!
//! The numeric values here are a contract with `shaders/triangle.wgsl`:
//! attribute locations, vertex buffer slots and the uniform binding must stay
//! identical between pipeline construction and every draw call.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Per-vertex inputs, keyed by shader location.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum VertexAttribute {
    Position = 0,
    Color = 1,
}

impl VertexAttribute {
    pub const ALL: [VertexAttribute; 2] = [VertexAttribute::Position, VertexAttribute::Color];

    #[inline]
    pub const fn location(self) -> u32 {
        self as u32
    }

    /// Buffer slot the attribute is fetched from.
    #[inline]
    pub const fn buffer(self) -> BufferIndex {
        match self {
            VertexAttribute::Position => BufferIndex::MeshPositions,
            VertexAttribute::Color => BufferIndex::MeshColors,
        }
    }
}

/// Binding slots shared by the pipeline layout and the draw encoder.
///
/// Mesh entries are vertex buffer slots; `Uniforms` is the binding number
/// inside [`UNIFORM_BIND_GROUP`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u32)]
pub enum BufferIndex {
    MeshPositions = 0,
    MeshColors = 1,
    Uniforms = 2,
}

impl BufferIndex {
    #[inline]
    pub const fn slot(self) -> u32 {
        self as u32
    }
}

/// Bind group that carries the uniform ring.
pub const UNIFORM_BIND_GROUP: u32 = 0;

/// Buffer-offset alignment required when packing several uniform records
/// into one buffer.
pub const UNIFORM_ALIGNMENT: usize = 256;

/// Rounds `size` up to the next multiple of `align` (a power of two).
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Per-frame uniform record.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Uniforms {
    pub transform: Mat4,
}

impl Uniforms {
    /// Half-size scale on x/y/z, identity on w.
    pub fn half_scale() -> Self {
        Self {
            transform: Mat4::from_diagonal(Vec4::new(0.5, 0.5, 0.5, 1.0)),
        }
    }
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
        }
    }
}

/// Pixel formats and sample count a pipeline renders into.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TargetFormats {
    pub color: wgpu::TextureFormat,
    pub depth_stencil: wgpu::TextureFormat,
    pub sample_count: u32,
}

impl Default for TargetFormats {
    fn default() -> Self {
        Self {
            color: wgpu::TextureFormat::Bgra8UnormSrgb,
            depth_stencil: wgpu::TextureFormat::Depth32FloatStencil8,
            sample_count: 1,
        }
    }
}
