use clap::Parser;
use winit::dpi::LogicalSize;

use trigon_engine::logging::LoggingConfig;
use trigon_engine::render::{RendererConfig, SubmissionMode};
use trigon_engine::window::RuntimeConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "trigon-viewer")]
#[command(about = "Triple-buffered wgpu triangle", long_about = None)]
pub struct Cli {
    /// Uniform ring size: frames the CPU may run ahead of the GPU
    #[arg(long = "frames-in-flight", default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=8))]
    pub frames_in_flight: u32,

    /// Wait for the GPU after every frame instead of overlapping
    #[arg(long)]
    pub blocking: bool,

    /// Initial window width in logical pixels
    #[arg(long, default_value_t = 800.0)]
    pub width: f64,

    /// Initial window height in logical pixels
    #[arg(long, default_value_t = 600.0)]
    pub height: f64,

    /// Log filter (env_logger syntax); overrides RUST_LOG
    #[arg(long = "log")]
    pub log_filter: Option<String>,
}

impl Cli {
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            max_buffers_in_flight: self.frames_in_flight as usize,
            submission: if self.blocking {
                SubmissionMode::Blocking
            } else {
                SubmissionMode::Overlapped
            },
            ..RendererConfig::default()
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            initial_size: LogicalSize::new(self.width, self.height),
            ..RuntimeConfig::default()
        }
    }

    pub fn logging_config(&self) -> LoggingConfig {
        match &self.log_filter {
            Some(filter) => LoggingConfig::with_filter(filter.clone()),
            None => LoggingConfig::default(),
        }
    }
}
