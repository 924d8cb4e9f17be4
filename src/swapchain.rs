//! Presentable image chain: selection policy, creation, recreation on resize.

use vulkanalia::vk::{self, Handle};

use crate::device::{RenderDevice, SwapchainRequest};
use crate::error::{RenderError, RenderResult};
use crate::window::WindowHost;

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> RenderResult<vk::SurfaceFormatKHR> {
    let fallback = formats.first().copied().ok_or(RenderError::NoCompatibleFormat)?;
    Ok(formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .unwrap_or(fallback))
}

pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> RenderResult<vk::PresentModeKHR> {
    if present_modes.is_empty() {
        return Err(RenderError::NoPresentModes);
    }
    Ok(present_modes
        .iter()
        .copied()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO))
}

/// `drawable` is only consulted when the surface leaves the extent to the
/// window (`current_extent.width == u32::MAX`).
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable: impl FnOnce() -> vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        let vk::Extent2D { width, height } = drawable();
        let clamp = |min: u32, max: u32, v: u32| min.max(max.min(v));
        vk::Extent2D {
            width: clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
                width,
            ),
            height: clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
                height,
            ),
        }
    }
}

pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count != 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// One generation of the swapchain and everything sized by it.
#[derive(Debug)]
pub struct SwapchainState {
    generation: u64,
    handle: vk::SwapchainKHR,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainState {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> RenderResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(RenderError::InvalidImageIndex {
                index: image_index,
                count: self.framebuffers.len(),
            })
    }
}

pub struct SwapchainLifecycle {
    render_pass: vk::RenderPass,
    attachment_format: vk::Format,
    state: SwapchainState,
}

impl SwapchainLifecycle {
    /// Builds generation 0. `render_pass` must have been created for
    /// `attachment_format`; the selected surface format has to match it.
    ///
    /// A window that starts minimized is waited on like in [`Self::recreate`];
    /// closing it before it gets a drawable area is [`RenderError::WindowClosed`].
    pub fn create<D, H>(
        device: &D,
        host: &mut H,
        render_pass: vk::RenderPass,
        attachment_format: vk::Format,
    ) -> RenderResult<Self>
    where
        D: RenderDevice + ?Sized,
        H: WindowHost + ?Sized,
    {
        if !wait_for_drawable(host) {
            return Err(RenderError::WindowClosed);
        }
        let state = build(device, host, render_pass, attachment_format, 0)?;
        Ok(Self {
            render_pass,
            attachment_format,
            state,
        })
    }

    pub fn state(&self) -> &SwapchainState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Rebuilds every extent-dependent object.
    ///
    /// Stops the world first: no submitted work may still reference the images
    /// about to be destroyed. While the window is minimized this keeps waiting
    /// for platform events; returns `Ok(false)` without rebuilding if the
    /// window is closed in the meantime.
    pub fn recreate<D, H>(&mut self, device: &D, host: &mut H) -> RenderResult<bool>
    where
        D: RenderDevice + ?Sized,
        H: WindowHost + ?Sized,
    {
        device
            .wait_idle()
            .map_err(|e| RenderError::vulkan("wait for device idle", e))?;

        if !wait_for_drawable(host) {
            log::info!("Window closed while minimized; skipping swapchain rebuild.");
            return Ok(false);
        }

        let generation = self.state.generation + 1;
        release(device, &mut self.state);
        self.state = build(
            device,
            host,
            self.render_pass,
            self.attachment_format,
            generation,
        )?;
        Ok(true)
    }

    /// Destroys framebuffers, views and the swapchain. The render pass belongs
    /// to the caller.
    pub fn destroy<D>(mut self, device: &D)
    where
        D: RenderDevice + ?Sized,
    {
        release(device, &mut self.state);
    }
}

/// Blocks on platform events until the window has a non-empty drawable area.
/// Returns `false` if the window is closed first.
fn wait_for_drawable<H>(host: &mut H) -> bool
where
    H: WindowHost + ?Sized,
{
    let mut extent = host.drawable_extent();
    while extent.width == 0 || extent.height == 0 {
        if host.close_requested() {
            return false;
        }
        log::debug!("Drawable area is empty, waiting for events.");
        host.wait_events();
        extent = host.drawable_extent();
    }
    true
}

fn build<D, H>(
    device: &D,
    host: &H,
    render_pass: vk::RenderPass,
    attachment_format: vk::Format,
    generation: u64,
) -> RenderResult<SwapchainState>
where
    D: RenderDevice + ?Sized,
    H: WindowHost + ?Sized,
{
    let support = device
        .surface_support()
        .map_err(|e| RenderError::vulkan("query surface support", e))?;

    let surface_format = choose_surface_format(&support.formats)?;
    if surface_format.format != attachment_format {
        return Err(RenderError::FormatChanged {
            expected: attachment_format,
            found: surface_format.format,
        });
    }
    let present_mode = choose_present_mode(&support.present_modes)?;
    let extent = choose_extent(&support.capabilities, || host.drawable_extent());
    let min_image_count = choose_image_count(&support.capabilities);
    let (sharing_mode, queue_family_indices) = device.queue_families().image_sharing();

    let request = SwapchainRequest {
        min_image_count,
        surface_format,
        present_mode,
        extent,
        pre_transform: support.capabilities.current_transform,
        sharing_mode,
        queue_family_indices,
    };

    let handle = device
        .create_swapchain(&request)
        .map_err(|e| RenderError::vulkan("create swapchain", e))?;

    let mut state = SwapchainState {
        generation,
        handle,
        surface_format,
        present_mode,
        extent,
        images: Vec::new(),
        image_views: Vec::new(),
        framebuffers: Vec::new(),
    };

    if let Err(error) = populate(device, &mut state, render_pass, &support.capabilities) {
        release(device, &mut state);
        return Err(error);
    }

    log::info!(
        "Created swapchain generation {} ({} images, {:?}, {:?}, {}x{}).",
        generation,
        state.images.len(),
        surface_format.format,
        present_mode,
        extent.width,
        extent.height
    );

    Ok(state)
}

fn populate<D>(
    device: &D,
    state: &mut SwapchainState,
    render_pass: vk::RenderPass,
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> RenderResult<()>
where
    D: RenderDevice + ?Sized,
{
    state.images = device
        .swapchain_images(state.handle)
        .map_err(|e| RenderError::vulkan("get swapchain images", e))?;

    let count = state.images.len();
    let below = count < capabilities.min_image_count as usize;
    let above = capabilities.max_image_count != 0 && count > capabilities.max_image_count as usize;
    if below || above {
        return Err(RenderError::ImageCountOutOfRange {
            count,
            min: capabilities.min_image_count,
            max: capabilities.max_image_count,
        });
    }

    for image in &state.images {
        let view = device
            .create_image_view(*image, state.surface_format.format)
            .map_err(|e| RenderError::vulkan("create swapchain image view", e))?;
        state.image_views.push(view);
    }

    for view in &state.image_views {
        let framebuffer = device
            .create_framebuffer(render_pass, *view, state.extent)
            .map_err(|e| RenderError::vulkan("create framebuffer", e))?;
        state.framebuffers.push(framebuffer);
    }

    Ok(())
}

/// Reverse dependency order: framebuffers, views, swapchain.
fn release<D>(device: &D, state: &mut SwapchainState)
where
    D: RenderDevice + ?Sized,
{
    for framebuffer in state.framebuffers.drain(..) {
        device.destroy_framebuffer(framebuffer);
    }
    for view in state.image_views.drain(..) {
        device.destroy_image_view(view);
    }
    state.images.clear();
    if !state.handle.is_null() {
        device.destroy_swapchain(state.handle);
        state.handle = vk::SwapchainKHR::null();
    }
}
