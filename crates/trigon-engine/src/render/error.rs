use thiserror::Error;

/// Failures surfaced by the rendering core.
///
/// Construction-time variants leave no partial renderer behind: either
/// `FrameRenderer::new` returns a fully built renderer or one of these.
/// `SurfaceFatal` and `DeviceLost` are the only per-frame errors; a frame
/// without a render target is not an error.
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("no GPU adapter available: {0}")]
    DeviceUnavailable(String),
    #[error("failed to create device/queue: {0}")]
    QueueCreation(String),
    #[error("bad pipeline descriptor: {0}")]
    BadPipelineDescriptor(String),
    #[error("bad depth state: {0}")]
    BadDepthState(String),
    #[error("buffer allocation failed: {0}")]
    BufferAllocation(String),
    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(String),
    #[error("offscreen readback failed: {0}")]
    Readback(String),
    #[error("presentation surface failed fatally")]
    SurfaceFatal,
    #[error("GPU device lost")]
    DeviceLost,
}

pub type RendererResult<T> = Result<T, RendererError>;
