use std::sync::Arc;

use glam::Vec3;
use wgpu::util::DeviceExt;

/// CPU-side triangle data uploaded once at startup.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TriangleMesh {
    pub indices: [u16; 3],
    pub positions: [Vec3; 3],
    pub colors: [Vec3; 3],
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self {
            indices: [0, 1, 2],
            positions: [
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            colors: [
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
        }
    }
}

/// Parameters of the single indexed draw issued every frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IndexedDraw {
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
    pub topology: wgpu::PrimitiveTopology,
}

/// Immutable device buffers for the triangle.
///
/// Written once by [`StaticGeometryStore::upload`], read-only afterwards; no
/// synchronization is needed for them.
#[derive(Clone)]
pub struct GeometryBuffers {
    pub indices: Arc<wgpu::Buffer>,
    pub positions: Arc<wgpu::Buffer>,
    pub colors: Arc<wgpu::Buffer>,
    draw: IndexedDraw,
}

impl GeometryBuffers {
    #[inline]
    pub fn draw_call(&self) -> IndexedDraw {
        self.draw
    }
}

/// Uploads static geometry into GPU-visible buffers.
pub struct StaticGeometryStore;

impl StaticGeometryStore {
    pub fn upload(device: &wgpu::Device, mesh: &TriangleMesh) -> GeometryBuffers {
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("IndexBuffer"),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("PositionBuffer"),
            contents: bytemuck::cast_slice(&mesh.positions),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let colors = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("ColorBuffer"),
            contents: bytemuck::cast_slice(&mesh.colors),
            usage: wgpu::BufferUsages::VERTEX,
        });

        GeometryBuffers {
            indices: Arc::new(indices),
            positions: Arc::new(positions),
            colors: Arc::new(colors),
            draw: triangle_draw(mesh),
        }
    }
}

fn triangle_draw(mesh: &TriangleMesh) -> IndexedDraw {
    IndexedDraw {
        index_count: mesh.indices.len() as u32,
        index_format: wgpu::IndexFormat::Uint16,
        topology: wgpu::PrimitiveTopology::TriangleList,
    }
}
