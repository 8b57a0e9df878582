mod app;
mod cli;

use clap::Parser;

use trigon_engine::device::GpuInit;
use trigon_engine::logging::init_logging;
use trigon_engine::window::Runtime;

use crate::app::TriangleApp;
use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logging_config());

    log::info!(
        "trigon viewer: {} frames in flight{}",
        cli.frames_in_flight,
        if cli.blocking { ", blocking" } else { "" }
    );

    Runtime::run(cli.runtime_config(), GpuInit::default(), TriangleApp::new(cli.renderer_config()))
}
