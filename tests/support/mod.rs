#![allow(dead_code)]

//! Scripted fakes for driving the frame loop without a GPU.
//!
//! `MockDevice` models fences, binary semaphores and command buffer lifetimes
//! closely enough to panic on the protocol mistakes a real driver would only
//! report through validation layers: recording a command buffer that is still
//! in flight, waiting on a fence nothing will ever signal, signaling a
//! semaphore twice, or beginning a render pass on a destroyed framebuffer.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use presenter_vk::device::{
    QueueFamilyIndices, RenderDevice, SwapchainRequest, SwapchainSupport, VkResult,
};
use presenter_vk::window::WindowHost;
use vulkanalia::vk::{self, Handle};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    // Window.
    PollExtent(vk::Extent2D),
    WaitEvents,

    // Swapchain objects.
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        min_image_count: u32,
        extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
        sharing_mode: vk::SharingMode,
        queue_family_indices: Vec<u32>,
    },
    DestroySwapchain(vk::SwapchainKHR),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateFramebuffer(vk::Framebuffer),
    DestroyFramebuffer(vk::Framebuffer),
    WaitIdle,

    // Synchronization.
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    Acquire {
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    },
    Submit {
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    },
    Present {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    },

    // Recording.
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    BeginRenderPass {
        command_buffer: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    },
    BindPipeline(vk::CommandBuffer, vk::Pipeline),
    SetViewport(vk::CommandBuffer, vk::Viewport),
    SetScissor(vk::CommandBuffer, vk::Rect2D),
    BindVertexBuffer {
        command_buffer: vk::CommandBuffer,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    Draw {
        command_buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
    },
    EndRenderPass(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
}

pub type CallLog = Rc<RefCell<Vec<Call>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    /// Attached to a submission the "GPU" has not finished yet.
    Pending,
}

struct State {
    next_handle: u64,
    support: SwapchainSupport,
    families: QueueFamilyIndices,
    image_count_override: Option<usize>,

    swapchains: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    next_image: HashMap<vk::SwapchainKHR, u32>,
    image_views: HashSet<vk::ImageView>,
    framebuffers: HashSet<vk::Framebuffer>,
    semaphores: HashMap<vk::Semaphore, bool>,
    fences: HashMap<vk::Fence, FenceState>,
    command_buffers: HashSet<vk::CommandBuffer>,
    last_submit_fence: HashMap<vk::CommandBuffer, vk::Fence>,

    acquires: usize,
    submits: usize,
    presents: usize,
    acquire_script: HashMap<usize, VkResult<vk::SuccessCode>>,
    submit_script: HashMap<usize, vk::ErrorCode>,
    present_script: HashMap<usize, VkResult<vk::SuccessCode>>,
}

pub struct MockDevice {
    log: CallLog,
    state: RefCell<State>,
}

pub fn default_support() -> SwapchainSupport {
    SwapchainSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        },
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

pub const ATTACHMENT_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

pub fn render_pass() -> vk::RenderPass {
    vk::RenderPass::from_raw(0xAA)
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_log(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            state: RefCell::new(State {
                next_handle: 1,
                support: default_support(),
                families: QueueFamilyIndices {
                    graphics: 0,
                    present: 0,
                },
                image_count_override: None,
                swapchains: HashMap::new(),
                next_image: HashMap::new(),
                image_views: HashSet::new(),
                framebuffers: HashSet::new(),
                semaphores: HashMap::new(),
                fences: HashMap::new(),
                command_buffers: HashSet::new(),
                last_submit_fence: HashMap::new(),
                acquires: 0,
                submits: 0,
                presents: 0,
                acquire_script: HashMap::new(),
                submit_script: HashMap::new(),
                present_script: HashMap::new(),
            }),
        }
    }

    /// A window sharing this device's call log.
    pub fn window(&self, extents: &[(u32, u32)]) -> MockWindow {
        MockWindow::new(self.log.clone(), extents)
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.log.borrow().iter().filter(|c| matches(c)).count()
    }

    pub fn set_support(&self, support: SwapchainSupport) {
        self.state.borrow_mut().support = support;
    }

    pub fn update_support(&self, update: impl FnOnce(&mut SwapchainSupport)) {
        update(&mut self.state.borrow_mut().support);
    }

    pub fn set_families(&self, graphics: u32, present: u32) {
        self.state.borrow_mut().families = QueueFamilyIndices { graphics, present };
    }

    pub fn override_image_count(&self, count: usize) {
        self.state.borrow_mut().image_count_override = Some(count);
    }

    /// Scripts the result of the `ordinal`th acquire (0-based, counting every
    /// acquire call across swapchain generations).
    pub fn script_acquire(&self, ordinal: usize, result: VkResult<vk::SuccessCode>) {
        self.state.borrow_mut().acquire_script.insert(ordinal, result);
    }

    pub fn script_present(&self, ordinal: usize, result: VkResult<vk::SuccessCode>) {
        self.state.borrow_mut().present_script.insert(ordinal, result);
    }

    pub fn fail_submit(&self, ordinal: usize, code: vk::ErrorCode) {
        self.state.borrow_mut().submit_script.insert(ordinal, code);
    }

    pub fn live_framebuffers(&self) -> HashSet<vk::Framebuffer> {
        self.state.borrow().framebuffers.clone()
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.borrow().swapchains.len()
    }

    /// Panics if anything created through the trait is still alive.
    pub fn assert_all_released(&self) {
        let state = self.state.borrow();
        assert!(state.swapchains.is_empty(), "leaked swapchains");
        assert!(state.image_views.is_empty(), "leaked image views");
        assert!(state.framebuffers.is_empty(), "leaked framebuffers");
        assert!(state.semaphores.is_empty(), "leaked semaphores");
        assert!(state.fences.is_empty(), "leaked fences");
        assert!(state.command_buffers.is_empty(), "leaked command buffers");
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn assert_recordable(&self, command_buffer: vk::CommandBuffer) {
        let state = self.state.borrow();
        assert!(
            state.command_buffers.contains(&command_buffer),
            "recording into unknown command buffer {command_buffer:?}"
        );
        if let Some(fence) = state.last_submit_fence.get(&command_buffer) {
            assert_ne!(
                state.fences.get(fence),
                Some(&FenceState::Pending),
                "recording command buffer {command_buffer:?} while its submission is in flight"
            );
        }
    }
}

impl State {
    fn handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn signal(&mut self, semaphore: vk::Semaphore) {
        let signaled = self
            .semaphores
            .get_mut(&semaphore)
            .unwrap_or_else(|| panic!("unknown semaphore {semaphore:?}"));
        assert!(!*signaled, "semaphore {semaphore:?} signaled twice");
        *signaled = true;
    }

    fn consume(&mut self, semaphore: vk::Semaphore) {
        let signaled = self
            .semaphores
            .get_mut(&semaphore)
            .unwrap_or_else(|| panic!("unknown semaphore {semaphore:?}"));
        assert!(
            *signaled,
            "waiting on semaphore {semaphore:?} that nothing signaled"
        );
        *signaled = false;
    }

    fn retire_all(&mut self) {
        for fence in self.fences.values_mut() {
            if *fence == FenceState::Pending {
                *fence = FenceState::Signaled;
            }
        }
    }
}

impl RenderDevice for MockDevice {
    fn surface_support(&self) -> VkResult<SwapchainSupport> {
        Ok(self.state.borrow().support.clone())
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.state.borrow().families
    }

    fn create_swapchain(&self, request: &SwapchainRequest) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.borrow_mut();
        let swapchain = vk::SwapchainKHR::from_raw(state.handle());
        let count = state
            .image_count_override
            .unwrap_or(request.min_image_count as usize);
        let images = (0..count)
            .map(|_| vk::Image::from_raw(state.handle()))
            .collect();
        state.swapchains.insert(swapchain, images);
        state.next_image.insert(swapchain, 0);
        drop(state);

        self.record(Call::CreateSwapchain {
            swapchain,
            min_image_count: request.min_image_count,
            extent: request.extent,
            present_mode: request.present_mode,
            sharing_mode: request.sharing_mode,
            queue_family_indices: request.queue_family_indices.clone(),
        });
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok(self
            .state
            .borrow()
            .swapchains
            .get(&swapchain)
            .unwrap_or_else(|| panic!("images of unknown swapchain {swapchain:?}"))
            .clone())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.borrow_mut();
        assert!(
            state.swapchains.remove(&swapchain).is_some(),
            "destroying unknown swapchain {swapchain:?}"
        );
        state.next_image.remove(&swapchain);
        drop(state);
        self.record(Call::DestroySwapchain(swapchain));
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        assert!(!image.is_null());
        assert_eq!(format, ATTACHMENT_FORMAT);
        let mut state = self.state.borrow_mut();
        let view = vk::ImageView::from_raw(state.handle());
        state.image_views.insert(view);
        drop(state);
        self.record(Call::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        assert!(
            self.state.borrow_mut().image_views.remove(&view),
            "destroying unknown image view {view:?}"
        );
        self.record(Call::DestroyImageView(view));
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.borrow_mut();
        assert!(!render_pass.is_null());
        assert!(state.image_views.contains(&view), "framebuffer over dead view");
        assert!(extent.width > 0 && extent.height > 0, "zero-sized framebuffer");
        let framebuffer = vk::Framebuffer::from_raw(state.handle());
        state.framebuffers.insert(framebuffer);
        drop(state);
        self.record(Call::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        assert!(
            self.state.borrow_mut().framebuffers.remove(&framebuffer),
            "destroying unknown framebuffer {framebuffer:?}"
        );
        self.record(Call::DestroyFramebuffer(framebuffer));
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.state.borrow_mut().retire_all();
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.state.borrow_mut();
        let semaphore = vk::Semaphore::from_raw(state.handle());
        state.semaphores.insert(semaphore, false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        assert!(
            self.state.borrow_mut().semaphores.remove(&semaphore).is_some(),
            "destroying unknown semaphore {semaphore:?}"
        );
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let fence = vk::Fence::from_raw(state.handle());
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(fence, initial);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        let removed = state.fences.remove(&fence);
        assert!(removed.is_some(), "destroying unknown fence {fence:?}");
        assert_ne!(
            removed,
            Some(FenceState::Pending),
            "destroying fence {fence:?} of a submission still in flight"
        );
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        let buffers = (0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.handle() as usize))
            .collect::<Vec<_>>();
        state.command_buffers.extend(buffers.iter().copied());
        Ok(buffers)
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.borrow_mut();
        for command_buffer in command_buffers {
            assert!(
                state.command_buffers.remove(command_buffer),
                "freeing unknown command buffer {command_buffer:?}"
            );
        }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        let current = state
            .fences
            .get_mut(&fence)
            .unwrap_or_else(|| panic!("waiting on unknown fence {fence:?}"));
        match *current {
            FenceState::Signaled => {}
            FenceState::Pending => *current = FenceState::Signaled,
            FenceState::Unsignaled => {
                panic!("deadlock: waiting on fence {fence:?} with no pending submission")
            }
        }
        drop(state);
        self.record(Call::WaitFence(fence));
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.borrow_mut();
        let current = state
            .fences
            .get_mut(&fence)
            .unwrap_or_else(|| panic!("resetting unknown fence {fence:?}"));
        assert_ne!(
            *current,
            FenceState::Pending,
            "resetting fence {fence:?} of a submission still in flight"
        );
        *current = FenceState::Unsignaled;
        drop(state);
        self.record(Call::ResetFence(fence));
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, vk::SuccessCode)> {
        self.record(Call::Acquire {
            swapchain,
            semaphore: signal,
        });

        let mut state = self.state.borrow_mut();
        let ordinal = state.acquires;
        state.acquires += 1;

        let count = state
            .swapchains
            .get(&swapchain)
            .unwrap_or_else(|| panic!("acquire from dead swapchain {swapchain:?}"))
            .len() as u32;

        let code = match state.acquire_script.remove(&ordinal) {
            Some(Err(e)) => return Err(e),
            Some(Ok(code)) => code,
            None => vk::SuccessCode::SUCCESS,
        };

        let next = state.next_image.entry(swapchain).or_insert(0);
        let image_index = *next % count;
        *next += 1;

        state.signal(signal);
        Ok((image_index, code))
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()> {
        self.record(Call::Submit {
            command_buffer,
            wait,
            signal,
            fence,
        });

        let mut state = self.state.borrow_mut();
        let ordinal = state.submits;
        state.submits += 1;
        if let Some(code) = state.submit_script.remove(&ordinal) {
            return Err(code);
        }

        assert_eq!(
            state.fences.get(&fence),
            Some(&FenceState::Unsignaled),
            "submitting with fence {fence:?} that was not reset"
        );
        state.consume(wait);
        state.signal(signal);
        state.fences.insert(fence, FenceState::Pending);
        state.last_submit_fence.insert(command_buffer, fence);
        Ok(())
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<vk::SuccessCode> {
        self.record(Call::Present {
            swapchain,
            image_index,
            wait,
        });

        let mut state = self.state.borrow_mut();
        let count = state
            .swapchains
            .get(&swapchain)
            .unwrap_or_else(|| panic!("present to dead swapchain {swapchain:?}"))
            .len() as u32;
        assert!(image_index < count, "presenting image {image_index} of {count}");
        state.consume(wait);

        let ordinal = state.presents;
        state.presents += 1;
        state
            .present_script
            .remove(&ordinal)
            .unwrap_or(Ok(vk::SuccessCode::SUCCESS))
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.assert_recordable(command_buffer);
        self.record(Call::ResetCommandBuffer(command_buffer));
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.assert_recordable(command_buffer);
        self.record(Call::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    ) {
        assert!(!render_pass.is_null());
        assert!(
            self.state.borrow().framebuffers.contains(&framebuffer),
            "render pass begun on destroyed framebuffer {framebuffer:?}"
        );
        self.record(Call::BeginRenderPass {
            command_buffer,
            framebuffer,
            render_area,
            clear_color,
        });
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(command_buffer, pipeline));
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(Call::SetViewport(command_buffer, viewport));
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(Call::SetScissor(command_buffer, scissor));
    }

    fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    ) {
        self.record(Call::BindVertexBuffer {
            command_buffer,
            binding,
            buffer,
            offset,
        });
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.record(Call::Draw {
            command_buffer,
            vertex_count,
            instance_count,
        });
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.record(Call::EndRenderPass(command_buffer));
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::EndCommandBuffer(command_buffer));
        Ok(())
    }
}

/// A window whose drawable size follows a script. Each poll consumes one
/// entry; the last entry repeats forever.
pub struct MockWindow {
    log: CallLog,
    extents: RefCell<VecDeque<vk::Extent2D>>,
    waits: Cell<usize>,
    close_after_waits: Option<usize>,
}

impl MockWindow {
    pub fn new(log: CallLog, extents: &[(u32, u32)]) -> Self {
        assert!(!extents.is_empty());
        Self {
            log,
            extents: RefCell::new(
                extents
                    .iter()
                    .map(|&(width, height)| vk::Extent2D { width, height })
                    .collect(),
            ),
            waits: Cell::new(0),
            close_after_waits: None,
        }
    }

    /// Reports a close request once `waits` calls to `wait_events` happened.
    pub fn close_after_waits(mut self, waits: usize) -> Self {
        self.close_after_waits = Some(waits);
        self
    }

    /// Replaces the remaining script.
    pub fn set_extents(&self, extents: &[(u32, u32)]) {
        *self.extents.borrow_mut() = extents
            .iter()
            .map(|&(width, height)| vk::Extent2D { width, height })
            .collect();
    }

    pub fn waits(&self) -> usize {
        self.waits.get()
    }
}

impl WindowHost for MockWindow {
    fn drawable_extent(&self) -> vk::Extent2D {
        let mut extents = self.extents.borrow_mut();
        let extent = if extents.len() > 1 {
            extents.pop_front().unwrap_or_default()
        } else {
            extents.front().copied().unwrap_or_default()
        };
        self.log.borrow_mut().push(Call::PollExtent(extent));
        extent
    }

    fn wait_events(&mut self) {
        self.waits.set(self.waits.get() + 1);
        self.log.borrow_mut().push(Call::WaitEvents);
    }

    fn close_requested(&self) -> bool {
        self.close_after_waits
            .is_some_and(|limit| self.waits.get() >= limit)
    }
}
