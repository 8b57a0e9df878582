//! Core engine-facing contracts.
//!
//! This module defines the interface between the runtime (platform loop)
//! and applications such as the viewer binary.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::FrameCtx;
