//! The device-side seam consumed by the frame loop.
//!
//! [`RenderDevice`] is the narrow slice of Vulkan the swapchain lifecycle,
//! frame synchronizer, command recorder and presenter actually call. The real
//! implementation lives on [`VulkanContext`](crate::context::VulkanContext);
//! tests drive the loop with a scripted fake.

use vulkanalia::vk;

pub type VkResult<T> = std::result::Result<T, vk::ErrorCode>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Sharing mode and family list for images touched by both queues.
    pub fn image_sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        if self.graphics != self.present {
            (
                vk::SharingMode::CONCURRENT,
                vec![self.graphics, self.present],
            )
        } else {
            (vk::SharingMode::EXCLUSIVE, vec![])
        }
    }
}

#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Everything needed to build a swapchain once the selection policy has run.
#[derive(Clone, Debug)]
pub struct SwapchainRequest {
    pub min_image_count: u32,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
}

pub trait RenderDevice {
    fn surface_support(&self) -> VkResult<SwapchainSupport>;
    fn queue_families(&self) -> QueueFamilyIndices;

    // Swapchain-dependent objects.
    fn create_swapchain(&self, request: &SwapchainRequest) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    /// Blocks until every queue on the device has drained.
    fn wait_idle(&self) -> VkResult<()>;

    // Frame slots.
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);
    /// Waits with no timeout.
    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    // Queue operations.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, vk::SuccessCode)>;
    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<()>;
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<vk::SuccessCode>;

    // Command recording.
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: [f32; 4],
    );
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_bind_vertex_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    );
    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;
}
