//! Rendering core.
//!
//! Everything here is built once at startup and read-only afterwards, except
//! the uniform ring, whose slots rotate between the CPU and the GPU:
//! - `types`: binding contract shared with `shaders/triangle.wgsl`
//! - `pipeline` + `shader`: immutable pipeline state
//! - `geometry`: static triangle buffers
//! - `ring` + `uniforms`: N-slot uniform ring and its device buffer
//! - `renderer`: per-frame acquire / write / encode / submit / present

mod error;
mod geometry;
mod pipeline;
mod renderer;
mod ring;
mod shader;
mod target;
mod types;
mod uniforms;

pub use error::{RendererError, RendererResult};
pub use geometry::{GeometryBuffers, IndexedDraw, StaticGeometryStore, TriangleMesh};
pub use pipeline::{
    primitive_state, DepthState, PipelineBuilder, PipelineState, VertexInput, VertexLayout,
};
pub use renderer::{
    FixedScale, FrameInfo, FrameOutcome, FrameRenderer, FrameReport, RendererConfig,
    SubmissionMode, UniformSource, MAX_BUFFERS_IN_FLIGHT,
};
pub use ring::{SlotCompletion, SlotHandle, SlotState, UniformRingBuffer};
pub use shader::{
    EntryPoint, ShaderBinding, ShaderInput, ShaderLibrary, ShaderStage, FRAGMENT_ENTRY,
    VERTEX_ENTRY,
};
pub use target::PresentationSurface;
pub use types::{
    align_up, BufferIndex, TargetFormats, Uniforms, VertexAttribute, UNIFORM_ALIGNMENT,
    UNIFORM_BIND_GROUP,
};
pub use uniforms::UniformBinding;
