use anyhow::Context;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, ModifiersState, PhysicalKey};

use trigon_engine::core::{App, AppControl, FrameCtx};
use trigon_engine::device::Gpu;
use trigon_engine::render::{FrameRenderer, RendererConfig};

/// Draws the triangle every frame until closed or quit.
pub struct TriangleApp {
    config: RendererConfig,
    renderer: Option<FrameRenderer>,
    modifiers: ModifiersState,
}

impl TriangleApp {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            modifiers: ModifiersState::empty(),
        }
    }
}

impl App for TriangleApp {
    fn on_gpu_ready(&mut self, gpu: &Gpu<'_>) -> anyhow::Result<()> {
        let renderer = FrameRenderer::new(gpu.context(), gpu.target_formats(), self.config)
            .context("failed to build the triangle renderer")?;
        self.renderer = Some(renderer);
        Ok(())
    }

    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::ModifiersChanged(m) => {
                self.modifiers = m.state();
                AppControl::Continue
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && is_quit_shortcut(self.modifiers, event.physical_key) =>
            {
                log::info!("quit requested");
                AppControl::Exit
            }
            _ => AppControl::Continue,
        }
    }

    fn on_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(size.width, size.height);
        }
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        match &mut self.renderer {
            Some(renderer) => ctx.draw(renderer),
            None => AppControl::Exit,
        }
    }

    fn on_exit(&mut self, gpu: &Gpu<'_>) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.wait_idle(gpu.context());
            log::info!("rendered {} frames", renderer.frame_index());
        }
    }
}

/// Cmd+Q on macOS, Ctrl+Q elsewhere.
fn is_quit_shortcut(modifiers: ModifiersState, key: PhysicalKey) -> bool {
    let held = if cfg!(target_os = "macos") {
        modifiers.super_key()
    } else {
        modifiers.control_key()
    };
    held && key == PhysicalKey::Code(KeyCode::KeyQ)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform_modifier() -> ModifiersState {
        if cfg!(target_os = "macos") {
            ModifiersState::SUPER
        } else {
            ModifiersState::CONTROL
        }
    }

    #[test]
    fn quit_needs_platform_modifier_and_q() {
        let q = PhysicalKey::Code(KeyCode::KeyQ);
        assert!(is_quit_shortcut(platform_modifier(), q));
        assert!(!is_quit_shortcut(ModifiersState::empty(), q));
        assert!(!is_quit_shortcut(ModifiersState::SHIFT, q));
        assert!(!is_quit_shortcut(platform_modifier(), PhysicalKey::Code(KeyCode::KeyW)));
    }
}
