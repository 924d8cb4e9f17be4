use std::mem::size_of;

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use glam::{vec2, vec3, Vec2, Vec3};
use vulkanalia::prelude::v1_3::*;

use crate::context::VulkanContext;
use crate::teardown::DeviceObject;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec2,
    pub color: Vec3,
}

impl Vertex {
    pub const fn new(pos: Vec2, color: Vec3) -> Self {
        Self { pos, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(0)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(size_of::<Vec2>() as u32)
                .build(),
        ]
    }
}

/// Top vertex red, bottom right green, bottom left blue. Clockwise in
/// framebuffer space.
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new(vec2(0.0, -0.5), vec3(1.0, 0.0, 0.0)),
    Vertex::new(vec2(0.5, 0.5), vec3(0.0, 1.0, 0.0)),
    Vertex::new(vec2(-0.5, 0.5), vec3(0.0, 0.0, 1.0)),
];

/// Uploads `vertices` once into host-visible, coherent memory. Buffer and
/// memory are registered with the context for teardown.
pub fn create_vertex_buffer(ctx: &mut VulkanContext, vertices: &[Vertex]) -> Result<vk::Buffer> {
    let bytes: &[u8] = bytemuck::cast_slice(vertices);
    let size = bytes.len() as vk::DeviceSize;

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { ctx.device().create_buffer(&buffer_info, None)? };
    let memory = match allocate_buffer_memory(ctx, buffer) {
        Ok(memory) => memory,
        Err(error) => {
            unsafe { ctx.device().destroy_buffer(buffer, None) };
            return Err(error);
        }
    };
    // Memory first, so the buffer is destroyed before its memory is freed.
    ctx.register(DeviceObject::Memory(memory));
    ctx.register(DeviceObject::Buffer(buffer));

    unsafe {
        ctx.device().bind_buffer_memory(buffer, memory, 0)?;
        let mapped = ctx
            .device()
            .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.cast::<u8>(), bytes.len());
        ctx.device().unmap_memory(memory);
    }

    log::debug!("Uploaded {} vertices ({size} bytes).", vertices.len());
    Ok(buffer)
}

fn allocate_buffer_memory(ctx: &VulkanContext, buffer: vk::Buffer) -> Result<vk::DeviceMemory> {
    let requirements = unsafe { ctx.device().get_buffer_memory_requirements(buffer) };
    let memory_type = get_memory_type(
        ctx,
        requirements,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type);

    Ok(unsafe { ctx.device().allocate_memory(&alloc_info, None)? })
}

fn get_memory_type(
    ctx: &VulkanContext,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let memory = unsafe {
        ctx.instance()
            .get_physical_device_memory_properties(ctx.physical_device())
    };

    (0..memory.memory_type_count)
        .find(|i| {
            let suitable = (requirements.memory_type_bits & (1 << i)) != 0;
            let memory_type = memory.memory_types[*i as usize];
            suitable && memory_type.property_flags.contains(properties)
        })
        .ok_or_else(|| anyhow!("Failed to find suitable memory type."))
}
