//! Instance, device and queue bootstrap.
//!
//! Everything here is one-shot setup. The context owns the device-lifetime
//! objects and implements [`RenderDevice`](crate::device::RenderDevice) for
//! the frame loop (see `backend.rs`).

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::prelude::v1_3::*;
use vulkanalia::vk::{ExtDebugUtilsExtension, KhrSurfaceExtension};
use vulkanalia::window as vk_window;
use winit::window::Window;

use crate::config::RendererConfig;
use crate::device::{QueueFamilyIndices, SwapchainSupport};
use crate::teardown::{DeviceObject, TeardownList};
use crate::validation::{self, VALIDATION_LAYER};

const DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];
const REQUIRED_API_VERSION: u32 = vk::make_version(1, 3, 0);

pub struct VulkanContext {
    #[allow(dead_code)]
    entry: Entry,
    pub(crate) instance: Instance,
    pub(crate) device: Device,
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) queue_families: QueueFamilyIndices,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
    pub(crate) command_pool: vk::CommandPool,
    messenger: Option<vk::DebugUtilsMessengerEXT>,
    teardown: TeardownList<DeviceObject>,
}

impl VulkanContext {
    pub fn create(window: &Window, config: &RendererConfig) -> Result<Self> {
        let loader = unsafe { LibloadingLoader::new(LIBRARY)? };
        let entry = unsafe { Entry::new(loader) }.map_err(|b| anyhow!("{}", b))?;

        let instance = create_instance(window, &entry, config.validation)?;
        let messenger = if config.validation {
            Some(unsafe { validation::create_messenger(&instance)? })
        } else {
            None
        };

        let surface = unsafe { vk_window::create_surface(&instance, window, window)? };
        let (physical_device, queue_families) = pick_physical_device(&instance, surface)?;
        let (device, graphics_queue, present_queue) =
            create_logical_device(&instance, physical_device, queue_families, config.validation)?;

        let mut teardown = TeardownList::new();
        let command_pool = create_command_pool(&device, queue_families)?;
        teardown.push(DeviceObject::CommandPool(command_pool));

        Ok(Self {
            entry,
            instance,
            device,
            surface,
            physical_device,
            queue_families,
            graphics_queue,
            present_queue,
            command_pool,
            messenger,
            teardown,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Hands a device-lifetime object to the context; it is released in
    /// reverse registration order by [`destroy`](Self::destroy).
    pub fn register(&mut self, object: DeviceObject) {
        self.teardown.push(object);
    }

    pub fn destroy(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Failed to wait for device idle during teardown: {e}");
            }

            for object in self.teardown.drain() {
                match object {
                    DeviceObject::CommandPool(pool) => self.device.destroy_command_pool(pool, None),
                    DeviceObject::RenderPass(render_pass) => {
                        self.device.destroy_render_pass(render_pass, None)
                    }
                    DeviceObject::PipelineLayout(layout) => {
                        self.device.destroy_pipeline_layout(layout, None)
                    }
                    DeviceObject::Pipeline(pipeline) => self.device.destroy_pipeline(pipeline, None),
                    DeviceObject::Buffer(buffer) => self.device.destroy_buffer(buffer, None),
                    DeviceObject::Memory(memory) => self.device.free_memory(memory, None),
                }
            }

            self.device.destroy_device(None);
            if let Some(messenger) = self.messenger.take() {
                self.instance.destroy_debug_utils_messenger_ext(messenger, None);
            }
            self.instance.destroy_surface_khr(self.surface, None);
            self.instance.destroy_instance(None);
        }
        log::info!("Vulkan context destroyed.");
    }
}

fn create_instance(window: &Window, entry: &Entry, enable_validation: bool) -> Result<Instance> {
    let loader_version =
        unsafe { entry.enumerate_instance_version() }.unwrap_or(vk::make_version(1, 0, 0));
    log::info!(
        "Vulkan loader version: {}.{}.{}",
        vk::version_major(loader_version),
        vk::version_minor(loader_version),
        vk::version_patch(loader_version)
    );
    if loader_version < REQUIRED_API_VERSION {
        return Err(anyhow!("Vulkan 1.3 loader required."));
    }

    let application_info = vk::ApplicationInfo::builder()
        .application_name(b"Presenter VK\0")
        .application_version(vk::make_version(1, 0, 0))
        .engine_name(b"No Engine\0")
        .engine_version(vk::make_version(1, 0, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions = vk_window::get_required_instance_extensions(window)
        .iter()
        .map(|e| e.as_ptr())
        .collect::<Vec<_>>();

    let mut layers = Vec::new();
    if enable_validation {
        unsafe { validation::check_validation_layer_support(entry)? };
        layers.push(VALIDATION_LAYER.as_ptr());
        extensions.push(vk::EXT_DEBUG_UTILS_EXTENSION.name.as_ptr());
    }

    let mut info = vk::InstanceCreateInfo::builder()
        .application_info(&application_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions);

    // Also covers messages emitted by instance creation and destruction.
    let mut debug_info = validation::messenger_info();
    if enable_validation {
        info = info.push_next(&mut debug_info);
    }

    Ok(unsafe { entry.create_instance(&info, None)? })
}

fn pick_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
    for physical_device in unsafe { instance.enumerate_physical_devices()? } {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        match check_physical_device(instance, surface, physical_device, &properties) {
            Ok(indices) => {
                log::info!("Selected physical device (`{}`).", properties.device_name);
                return Ok((physical_device, indices));
            }
            Err(error) => log::warn!(
                "Skipping physical device (`{}`): {}",
                properties.device_name,
                error
            ),
        }
    }

    Err(anyhow!("Failed to find suitable physical device."))
}

fn check_physical_device(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    properties: &vk::PhysicalDeviceProperties,
) -> Result<QueueFamilyIndices> {
    if properties.api_version < REQUIRED_API_VERSION {
        return Err(anyhow!("Vulkan 1.3 not supported."));
    }

    let indices = find_queue_families(instance, surface, physical_device)?;
    check_physical_device_extensions(instance, physical_device)?;

    let support = query_swapchain_support(instance, surface, physical_device)?;
    if support.formats.is_empty() || support.present_modes.is_empty() {
        return Err(anyhow!("Insufficient swapchain support."));
    }

    Ok(indices)
}

fn find_queue_families(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueFamilyIndices> {
    let properties =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let graphics = properties
        .iter()
        .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32);

    let mut present = None;
    for (index, _) in properties.iter().enumerate() {
        let supported = unsafe {
            instance.get_physical_device_surface_support_khr(physical_device, index as u32, surface)?
        };
        if supported {
            present = Some(index as u32);
            break;
        }
    }

    if let (Some(graphics), Some(present)) = (graphics, present) {
        Ok(QueueFamilyIndices { graphics, present })
    } else {
        Err(anyhow!("Missing required queue families."))
    }
}

fn check_physical_device_extensions(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<()> {
    let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device, None)? }
        .iter()
        .map(|e| e.extension_name)
        .collect::<HashSet<_>>();
    if DEVICE_EXTENSIONS.iter().all(|e| extensions.contains(e)) {
        Ok(())
    } else {
        Err(anyhow!("Missing required device extensions."))
    }
}

pub(crate) fn query_swapchain_support(
    instance: &Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> std::result::Result<SwapchainSupport, vk::ErrorCode> {
    unsafe {
        Ok(SwapchainSupport {
            capabilities: instance
                .get_physical_device_surface_capabilities_khr(physical_device, surface)?,
            formats: instance.get_physical_device_surface_formats_khr(physical_device, surface)?,
            present_modes: instance
                .get_physical_device_surface_present_modes_khr(physical_device, surface)?,
        })
    }
}

fn create_logical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    indices: QueueFamilyIndices,
    validation: bool,
) -> Result<(Device, vk::Queue, vk::Queue)> {
    let mut unique_indices = HashSet::new();
    unique_indices.insert(indices.graphics);
    unique_indices.insert(indices.present);

    let queue_priorities = &[1.0];
    let queue_infos = unique_indices
        .iter()
        .map(|i| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(*i)
                .queue_priorities(queue_priorities)
        })
        .collect::<Vec<_>>();

    let layers = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let extensions = DEVICE_EXTENSIONS
        .iter()
        .map(|n| n.as_ptr())
        .collect::<Vec<_>>();

    let mut sync2_features =
        vk::PhysicalDeviceSynchronization2Features::builder().synchronization2(true);

    let features = vk::PhysicalDeviceFeatures::builder();

    let info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions)
        .enabled_features(&features)
        .push_next(&mut sync2_features);

    let device = unsafe { instance.create_device(physical_device, &info, None)? };

    let graphics_queue = unsafe { device.get_device_queue(indices.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(indices.present, 0) };

    Ok((device, graphics_queue, present_queue))
}

fn create_command_pool(device: &Device, indices: QueueFamilyIndices) -> Result<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(indices.graphics);

    Ok(unsafe { device.create_command_pool(&info, None)? })
}
