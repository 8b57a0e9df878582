//! GPU device + surface management.
//!
//! This module is responsible for:
//! - opening the wgpu Device/Queue and delivering submission completions
//! - creating & configuring the window Surface and its depth attachment
//! - offscreen render targets for headless runs

mod context;
mod error;
mod frame;
mod gpu;
mod init;
mod offscreen;
mod surface;

pub use context::{CommandBuffer, GraphicsContext};
pub use error::SurfaceErrorAction;
pub use frame::SurfaceFrame;
pub use gpu::Gpu;
pub use init::GpuInit;
pub use offscreen::OffscreenTarget;
