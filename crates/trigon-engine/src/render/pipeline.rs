//! Immutable pipeline-state construction.
//!
//! Built once at renderer startup. Any failure here is a construction failure
//! of the whole renderer.

use std::num::NonZeroU64;
use std::sync::Arc;

use super::error::{RendererError, RendererResult};
use super::shader::{EntryPoint, ShaderLibrary, ShaderStage, FRAGMENT_ENTRY, VERTEX_ENTRY};
use super::types::{BufferIndex, TargetFormats, Uniforms, VertexAttribute, UNIFORM_BIND_GROUP};

const FLOAT3_STRIDE: u64 = std::mem::size_of::<[f32; 3]>() as u64;

// ── vertex layout ─────────────────────────────────────────────────────────

/// One vertex input: shader location, format and the buffer slot it reads from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexInput {
    pub attribute: VertexAttribute,
    pub format: wgpu::VertexFormat,
    pub buffer: BufferIndex,
    pub stride: u64,
    pub step_mode: wgpu::VertexStepMode,
}

/// Per-vertex input description: one attribute per buffer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VertexLayout {
    inputs: Vec<VertexInput>,
    // Backing storage for `wgpu::VertexBufferLayout::attributes`.
    attributes: Vec<[wgpu::VertexAttribute; 1]>,
}

impl VertexLayout {
    pub fn new(inputs: Vec<VertexInput>) -> Self {
        let attributes = inputs
            .iter()
            .map(|i| {
                [wgpu::VertexAttribute {
                    format: i.format,
                    offset: 0,
                    shader_location: i.attribute.location(),
                }]
            })
            .collect();
        Self { inputs, attributes }
    }

    /// Position and color, each a float3 from its own buffer, stepped per vertex.
    pub fn triangle() -> Self {
        Self::new(
            VertexAttribute::ALL
                .iter()
                .map(|&attribute| VertexInput {
                    attribute,
                    format: wgpu::VertexFormat::Float32x3,
                    buffer: attribute.buffer(),
                    stride: FLOAT3_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                })
                .collect(),
        )
    }

    pub fn inputs(&self) -> &[VertexInput] {
        &self.inputs
    }

    /// Checks the layout against the binding contract in `render::types`.
    pub fn validate(&self) -> RendererResult<()> {
        let bad = |msg: String| Err(RendererError::BadPipelineDescriptor(msg));

        for (n, input) in self.inputs.iter().enumerate() {
            if input.format != wgpu::VertexFormat::Float32x3 {
                return bad(format!("{:?} must be Float32x3, got {:?}", input.attribute, input.format));
            }
            if input.buffer != input.attribute.buffer() {
                return bad(format!(
                    "{:?} bound to {:?}, expected {:?}",
                    input.attribute,
                    input.buffer,
                    input.attribute.buffer()
                ));
            }
            if input.stride != FLOAT3_STRIDE {
                return bad(format!("{:?} stride {} != {FLOAT3_STRIDE}", input.attribute, input.stride));
            }
            if input.step_mode != wgpu::VertexStepMode::Vertex {
                return bad(format!("{:?} must step per vertex", input.attribute));
            }
            if self.inputs[..n].iter().any(|o| o.attribute == input.attribute) {
                return bad(format!("{:?} declared twice", input.attribute));
            }
        }

        for attribute in VertexAttribute::ALL {
            if !self.inputs.iter().any(|i| i.attribute == attribute) {
                return bad(format!("{attribute:?} missing from vertex layout"));
            }
        }

        Ok(())
    }

    /// Buffer layouts indexed by vertex buffer slot.
    fn buffer_layouts(&self) -> Vec<wgpu::VertexBufferLayout<'_>> {
        let mut order: Vec<usize> = (0..self.inputs.len()).collect();
        order.sort_by_key(|&i| self.inputs[i].buffer.slot());

        order
            .into_iter()
            .map(|i| wgpu::VertexBufferLayout {
                array_stride: self.inputs[i].stride,
                step_mode: self.inputs[i].step_mode,
                attributes: &self.attributes[i],
            })
            .collect()
    }
}

// ── depth state ───────────────────────────────────────────────────────────

/// Depth test configuration: compare `Less`, writes enabled.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DepthState {
    state: wgpu::DepthStencilState,
}

impl DepthState {
    pub fn new(format: wgpu::TextureFormat) -> RendererResult<Self> {
        if !format.has_depth_aspect() {
            return Err(RendererError::BadDepthState(format!(
                "{format:?} has no depth aspect"
            )));
        }

        Ok(Self {
            state: wgpu::DepthStencilState {
                format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            },
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.state.format
    }

    pub fn compare(&self) -> wgpu::CompareFunction {
        self.state.depth_compare
    }

    pub fn writes_enabled(&self) -> bool {
        self.state.depth_write_enabled
    }

    pub fn has_stencil(&self) -> bool {
        self.state.format.has_stencil_aspect()
    }

    pub(crate) fn descriptor(&self) -> wgpu::DepthStencilState {
        self.state.clone()
    }
}

// ── pipeline state ────────────────────────────────────────────────────────

/// Rasterizer configuration applied to every draw.
pub fn primitive_state() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: Some(wgpu::Face::Back),
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

/// Compiled pipeline plus the objects that must match it at draw time.
///
/// Shared read-only by every frame.
#[derive(Clone)]
pub struct PipelineState {
    pub pipeline: Arc<wgpu::RenderPipeline>,
    pub uniform_layout: Arc<wgpu::BindGroupLayout>,
    pub depth: DepthState,
    pub formats: TargetFormats,
}

/// Builds [`PipelineState`] from a vertex layout, a shader library and target formats.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: &'a str,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self {
            device,
            label: "RenderPipeline",
        }
    }

    pub fn label(mut self, label: &'a str) -> Self {
        self.label = label;
        self
    }

    /// Validates inputs, then compiles the pipeline.
    ///
    /// All checks run before the device is touched so a failure leaves no
    /// half-built state behind.
    pub fn build(
        &self,
        layout: &VertexLayout,
        shaders: &ShaderLibrary,
        formats: TargetFormats,
    ) -> RendererResult<PipelineState> {
        layout.validate()?;
        let vertex_entry = shaders.resolve(VERTEX_ENTRY, ShaderStage::Vertex)?;
        let fragment_entry = shaders.resolve(FRAGMENT_ENTRY, ShaderStage::Fragment)?;
        check_shader_interface(layout, shaders, vertex_entry, fragment_entry)?;
        if formats.sample_count != 1 {
            return Err(RendererError::BadPipelineDescriptor(format!(
                "sample count {} unsupported; only 1 is",
                formats.sample_count
            )));
        }
        let depth = DepthState::new(formats.depth_stencil)?;

        let module = shaders.create_module(self.device);

        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("UniformBindGroupLayout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: BufferIndex::Uniforms.slot(),
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: uniforms_binding_size(),
                    },
                    count: None,
                }],
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("RenderPipelineLayout"),
                bind_group_layouts: &[&uniform_layout],
                immediate_size: 0,
            });

        let buffers = layout.buffer_layouts();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(self.label),
                layout: Some(&pipeline_layout),

                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(vertex_entry.name.as_str()),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },

                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some(fragment_entry.name.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: formats.color,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),

                primitive: primitive_state(),
                depth_stencil: Some(depth.descriptor()),
                multisample: wgpu::MultisampleState {
                    count: formats.sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },

                multiview_mask: None,
                cache: None,
            });

        log::debug!(
            "built pipeline `{}` (color {:?}, depth {:?}, samples {})",
            self.label,
            formats.color,
            formats.depth_stencil,
            formats.sample_count
        );

        Ok(PipelineState {
            pipeline: Arc::new(pipeline),
            uniform_layout: Arc::new(uniform_layout),
            depth,
            formats,
        })
    }
}

/// Checks what the shader reads and writes against what the pipeline will bind.
///
/// wgpu reports these mismatches through its uncaptured-error handler, so
/// they have to be caught here.
fn check_shader_interface(
    layout: &VertexLayout,
    shaders: &ShaderLibrary,
    vertex: &EntryPoint,
    fragment: &EntryPoint,
) -> RendererResult<()> {
    let bad = |msg: String| Err(RendererError::BadPipelineDescriptor(msg));

    for input in shaders.vertex_inputs(vertex) {
        let Some(provided) = layout
            .inputs()
            .iter()
            .find(|i| i.attribute.location() == input.location)
        else {
            return bad(format!(
                "`{}` reads @location({}), which the vertex layout does not provide",
                vertex.name, input.location
            ));
        };
        if input.format != Some(provided.format) {
            return bad(format!(
                "`{}` @location({}) expects {:?}, vertex layout provides {:?}",
                vertex.name, input.location, input.format, provided.format
            ));
        }
    }

    let outputs = shaders.fragment_outputs(fragment);
    if outputs.iter().any(|&l| l != 0) {
        return bad(format!(
            "`{}` writes color locations {outputs:?}; only @location(0) has a target",
            fragment.name
        ));
    }

    let record = std::mem::size_of::<Uniforms>() as u32;
    for b in shaders.bindings() {
        if b.group != UNIFORM_BIND_GROUP || b.binding != BufferIndex::Uniforms.slot() {
            return bad(format!(
                "shader declares @group({}) @binding({}); only @group({UNIFORM_BIND_GROUP}) @binding({}) is bound",
                b.group,
                b.binding,
                BufferIndex::Uniforms.slot()
            ));
        }
        if !b.uniform {
            return bad(format!("@binding({}) must be in the uniform address space", b.binding));
        }
        if b.size > record {
            return bad(format!("uniform block is {} bytes, at most {record} are bound", b.size));
        }
    }

    Ok(())
}

/// Size of one bound uniform record. `Uniforms` is 64 bytes, never zero.
pub(crate) fn uniforms_binding_size() -> Option<NonZeroU64> {
    NonZeroU64::new(std::mem::size_of::<Uniforms>() as u64)
}
