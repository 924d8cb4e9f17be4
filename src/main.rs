use std::env;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::LevelFilter;

use presenter_vk::config::RendererConfig;
use presenter_vk::context::VulkanContext;
use presenter_vk::device::RenderDevice;
use presenter_vk::pipeline::{create_pipeline, create_render_pass};
use presenter_vk::presenter::{DrawInputs, FrameOutcome, Presenter};
use presenter_vk::swapchain::{choose_surface_format, SwapchainLifecycle};
use presenter_vk::sync::FrameSynchronizer;
use presenter_vk::vertex::{create_vertex_buffer, TRIANGLE};
use presenter_vk::window::{PlatformWindow, WindowHost};
use presenter_vk::{RenderError, RenderResult};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_builder();
    match env::var("RUST_LOG") {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(LevelFilter::Info),
    };
    builder.init();
}

fn main() -> Result<()> {
    init_logging();

    let config = RendererConfig::from_args(env::args().skip(1))?;
    log::info!(
        "Starting with {}x{}, {} frames in flight, validation {}.",
        config.width,
        config.height,
        config.frames_in_flight,
        if config.validation { "on" } else { "off" }
    );

    let mut window = PlatformWindow::new(&config)?;
    let mut ctx = VulkanContext::create(window.window(), &config)?;

    let presenter = build_presenter(&mut ctx, &mut window, &config);
    let result = match presenter {
        Ok(mut presenter) => {
            let run = run(&mut presenter, &ctx, &mut window);
            if let Err(e) = presenter.destroy(&ctx) {
                log::error!("Failed to tear down frame loop: {e}");
            }
            run.map_err(anyhow::Error::from)
        }
        Err(e) if matches!(e.downcast_ref::<RenderError>(), Some(RenderError::WindowClosed)) => {
            log::info!("Window closed before the first frame.");
            Ok(())
        }
        Err(e) => Err(e),
    };

    ctx.destroy();

    if let Err(e) = &result {
        log::error!("Fatal: {e:#}");
    }
    result
}

fn build_presenter(
    ctx: &mut VulkanContext,
    window: &mut PlatformWindow,
    config: &RendererConfig,
) -> Result<Presenter> {
    let support = ctx
        .surface_support()
        .context("Failed to query surface support.")?;
    let surface_format = choose_surface_format(&support.formats)?;

    let render_pass = create_render_pass(ctx, surface_format.format)?;
    let pipeline = create_pipeline(ctx, render_pass)?;
    let vertex_buffer = create_vertex_buffer(ctx, &TRIANGLE)?;

    let swapchain = SwapchainLifecycle::create(&*ctx, window, render_pass, surface_format.format)?;
    let sync = match FrameSynchronizer::new(&*ctx, config.frames_in_flight) {
        Ok(sync) => sync,
        Err(e) => {
            swapchain.destroy(&*ctx);
            return Err(e.into());
        }
    };

    let draw = DrawInputs {
        pipeline,
        vertex_buffer,
        vertex_count: TRIANGLE.len() as u32,
        clear_color: config.clear_color,
    };

    Ok(Presenter::new(swapchain, sync, draw, window.resize_signal()))
}

fn run(presenter: &mut Presenter, ctx: &VulkanContext, window: &mut PlatformWindow) -> RenderResult<()> {
    let mut presented = 0u64;
    let mut skipped = 0u64;
    let mut last_report = Instant::now();

    loop {
        window.pump(Some(Duration::ZERO));
        if window.close_requested() {
            break;
        }

        match presenter.advance_frame(ctx, window)? {
            FrameOutcome::Presented { .. } => presented += 1,
            FrameOutcome::Skipped { .. } => skipped += 1,
        }

        let elapsed = last_report.elapsed();
        if elapsed >= STATS_INTERVAL {
            log::info!(
                "{:.1} fps, swapchain generation {}, {skipped} frames skipped.",
                presented as f64 / elapsed.as_secs_f64(),
                presenter.swapchain().generation()
            );
            presented = 0;
            skipped = 0;
            last_report = Instant::now();
        }
    }

    log::info!("Close requested after {} frames.", presenter.frame_index());
    Ok(())
}
