//! Window-side collaborators of the frame loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use vulkanalia::vk;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowBuilder};

use crate::config::RendererConfig;

/// What the swapchain lifecycle needs from the window layer.
pub trait WindowHost {
    /// Current drawable size in physical pixels. `(0, 0)` while minimized.
    fn drawable_extent(&self) -> vk::Extent2D;
    /// Blocks until at least one platform event has been processed.
    fn wait_events(&mut self);
    fn close_requested(&self) -> bool;
}

/// Raised by the window layer when the framebuffer size changes, consumed once
/// per frame by the presenter.
#[derive(Clone, Debug, Default)]
pub struct ResizeSignal(Arc<AtomicBool>);

impl ResizeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clears the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A winit window driven by explicit event pumping, so the frame loop decides
/// when platform events are processed.
pub struct PlatformWindow {
    event_loop: EventLoop<()>,
    window: Window,
    resize: ResizeSignal,
    close_requested: bool,
}

impl PlatformWindow {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let event_loop = EventLoop::new()?;
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .build(&event_loop)?;

        Ok(Self {
            event_loop,
            window,
            resize: ResizeSignal::new(),
            close_requested: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn resize_signal(&self) -> ResizeSignal {
        self.resize.clone()
    }

    /// Processes pending events, waiting at most `timeout` (`None` blocks until
    /// an event arrives).
    pub fn pump(&mut self, timeout: Option<Duration>) {
        let resize = &self.resize;
        let close_requested = &mut self.close_requested;

        let status = self
            .event_loop
            .pump_events(timeout, |event, _target| match event {
                Event::WindowEvent {
                    event: WindowEvent::CloseRequested,
                    ..
                } => *close_requested = true,
                Event::WindowEvent {
                    event: WindowEvent::Resized(size),
                    ..
                } => {
                    log::debug!("Window resized to {}x{}", size.width, size.height);
                    resize.raise();
                }
                _ => {}
            });

        if let PumpStatus::Exit(code) = status {
            log::info!("Event loop exited with code {code}");
            self.close_requested = true;
        }
    }
}

impl WindowHost for PlatformWindow {
    fn drawable_extent(&self) -> vk::Extent2D {
        let PhysicalSize { width, height } = self.window.inner_size();
        vk::Extent2D { width, height }
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn close_requested(&self) -> bool {
        self.close_requested
    }
}
