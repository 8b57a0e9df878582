//! Trigon engine crate.
//!
//! A triple-buffered triangle renderer on wgpu:
//! - `render`: the rendering core (pipeline, static geometry, uniform ring,
//!   frame renderer)
//! - `device`: device/queue ownership, window surface, offscreen targets
//! - `window` + `core`: the winit runtime and the application contract

pub mod core;
pub mod device;
pub mod logging;
pub mod render;
pub mod window;
