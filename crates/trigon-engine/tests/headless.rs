//! End-to-end rendering against a real adapter, without a window.
//!
//! Every test returns early when the machine has no usable adapter.

use pollster::block_on;

use trigon_engine::device::{GpuInit, GraphicsContext, OffscreenTarget, SurfaceFrame};
use trigon_engine::render::{
    FrameOutcome, FrameRenderer, PipelineBuilder, PresentationSurface, RendererConfig,
    RendererError, RendererResult, ShaderLibrary, SubmissionMode, TargetFormats, VertexLayout,
};

const SIZE: u32 = 64;
const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn context() -> Option<GraphicsContext> {
    match block_on(GraphicsContext::headless(&GpuInit::default())) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

fn target(ctx: &GraphicsContext) -> OffscreenTarget {
    OffscreenTarget::new(ctx, COLOR_FORMAT, SIZE, SIZE).unwrap()
}

fn renderer(ctx: &GraphicsContext, formats: TargetFormats, n: usize, mode: SubmissionMode) -> FrameRenderer {
    let config = RendererConfig {
        max_buffers_in_flight: n,
        submission: mode,
        ..RendererConfig::default()
    };
    FrameRenderer::new(ctx, formats, config).unwrap()
}

struct NoTarget;

impl PresentationSurface for NoTarget {
    fn acquire_frame(&self) -> RendererResult<Option<SurfaceFrame>> {
        Ok(None)
    }
}

struct BrokenSurface;

impl PresentationSurface for BrokenSurface {
    fn acquire_frame(&self) -> RendererResult<Option<SurfaceFrame>> {
        Err(RendererError::SurfaceFatal)
    }
}

fn pixel(pixels: &[u8], x: u32, y: u32) -> [u8; 4] {
    let i = ((y * SIZE + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

// ── rotation ─────────────────────────────────────────────────────────────

#[test]
fn five_frames_rotate_through_three_slots() {
    let Some(ctx) = context() else { return };
    let target = target(&ctx);
    let mut r = renderer(&ctx, target.target_formats(), 3, SubmissionMode::Overlapped);

    let mut slots = Vec::new();
    for i in 0..5 {
        let report = r.draw(&ctx, &target).unwrap();
        assert_eq!(report.frame_index, i);
        assert_eq!(report.outcome, FrameOutcome::Rendered);
        slots.push(report.slot);
    }
    assert_eq!(slots, [0, 1, 2, 0, 1]);
    assert!(r.ring().in_flight() <= 3);

    r.wait_idle(&ctx);
    assert_eq!(r.ring().in_flight(), 0);
    assert_eq!(r.geometry().draw_call().index_count, 3);
}

#[test]
fn many_frames_never_exceed_ring_size() {
    let Some(ctx) = context() else { return };
    let target = target(&ctx);
    let mut r = renderer(&ctx, target.target_formats(), 3, SubmissionMode::Overlapped);

    for i in 0..30u64 {
        let report = r.draw(&ctx, &target).unwrap();
        assert_eq!(report.slot, (i % 3) as usize);
        assert!(r.ring().in_flight() <= 3);
    }
    r.wait_idle(&ctx);
    assert_eq!(r.frame_index(), 30);
}

#[test]
fn blocking_mode_returns_with_every_slot_free() {
    let Some(ctx) = context() else { return };
    let target = target(&ctx);
    let mut r = renderer(&ctx, target.target_formats(), 1, SubmissionMode::Blocking);

    for _ in 0..3 {
        let report = r.draw(&ctx, &target).unwrap();
        assert_eq!(report.slot, 0);
        assert_eq!(r.ring().in_flight(), 0);
    }
}

// ── missing or failing targets ───────────────────────────────────────────

#[test]
fn frames_without_target_still_release_their_slot() {
    let Some(ctx) = context() else { return };
    let formats = TargetFormats {
        color: COLOR_FORMAT,
        depth_stencil: ctx.depth_stencil_format(),
        sample_count: 1,
    };
    let mut r = renderer(&ctx, formats, 2, SubmissionMode::Overlapped);

    for _ in 0..6 {
        let report = r.draw(&ctx, &NoTarget).unwrap();
        assert_eq!(report.outcome, FrameOutcome::Skipped);
    }
    r.wait_idle(&ctx);
    assert_eq!(r.ring().in_flight(), 0);
}

#[test]
fn fatal_surface_error_is_reported_after_commit() {
    let Some(ctx) = context() else { return };
    let formats = TargetFormats {
        color: COLOR_FORMAT,
        depth_stencil: ctx.depth_stencil_format(),
        sample_count: 1,
    };
    let mut r = renderer(&ctx, formats, 1, SubmissionMode::Overlapped);

    assert!(matches!(r.draw(&ctx, &BrokenSurface), Err(RendererError::SurfaceFatal)));
    r.wait_idle(&ctx);
    assert_eq!(r.ring().in_flight(), 0);
}

// ── construction failures ────────────────────────────────────────────────

#[test]
fn multisampled_targets_are_rejected() {
    let Some(ctx) = context() else { return };
    let formats = TargetFormats {
        color: COLOR_FORMAT,
        depth_stencil: ctx.depth_stencil_format(),
        sample_count: 4,
    };
    let err = FrameRenderer::new(&ctx, formats, RendererConfig::default()).err();
    assert!(matches!(err, Some(RendererError::BadPipelineDescriptor(_))));
}

#[test]
fn color_format_as_depth_is_rejected() {
    let Some(ctx) = context() else { return };
    let formats = TargetFormats {
        color: COLOR_FORMAT,
        depth_stencil: COLOR_FORMAT,
        sample_count: 1,
    };
    let err = FrameRenderer::new(&ctx, formats, RendererConfig::default()).err();
    assert!(matches!(err, Some(RendererError::BadDepthState(_))));
}

#[test]
fn shader_reading_integer_positions_is_rejected() {
    let Some(ctx) = context() else { return };
    let lib = ShaderLibrary::from_wgsl(
        "uint positions",
        "@vertex fn vertexShader(@location(0) p: vec4<u32>) -> @builtin(position) vec4<f32> {
            return vec4<f32>(p);
        }
        @fragment fn fragmentShader() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }",
    )
    .unwrap();
    let formats = TargetFormats {
        color: COLOR_FORMAT,
        depth_stencil: ctx.depth_stencil_format(),
        sample_count: 1,
    };
    let err = PipelineBuilder::new(ctx.device())
        .build(&VertexLayout::triangle(), &lib, formats)
        .err();
    assert!(matches!(err, Some(RendererError::BadPipelineDescriptor(_))));
}

// ── output ───────────────────────────────────────────────────────────────

#[test]
fn half_size_triangle_covers_center_only() {
    let Some(ctx) = context() else { return };
    let target = target(&ctx);
    let mut r = renderer(&ctx, target.target_formats(), 3, SubmissionMode::Overlapped);

    r.draw(&ctx, &target).unwrap();
    r.wait_idle(&ctx);
    let pixels = target.read_pixels(&ctx).unwrap();
    assert_eq!(pixels.len(), (SIZE * SIZE * 4) as usize);

    // Scaled by 0.5 the triangle never reaches the corners.
    assert_eq!(pixel(&pixels, 0, 0), [0, 0, 0, 255]);
    assert_eq!(pixel(&pixels, SIZE - 1, SIZE - 1), [0, 0, 0, 255]);

    // The center blends the three vertex colors, weighted toward blue.
    let [red, green, blue, alpha] = pixel(&pixels, SIZE / 2, SIZE / 2);
    assert_eq!(alpha, 255);
    assert!(blue > red && blue > green, "center pixel {:?}", [red, green, blue]);
}
