//! Per-frame synchronization ring.
//!
//! Each slot pairs two semaphores, which chain acquire → draw → present on
//! the GPU without a host round trip, with a fence, the only primitive the
//! host can wait on. The fence guards reuse of the slot's command buffer.

use vulkanalia::vk;

use crate::device::RenderDevice;
use crate::error::{RenderError, RenderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    pub index: usize,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
}

impl FrameSynchronizer {
    /// Creates `frames_in_flight` slots. Fences start signaled so the first
    /// wait on each slot returns immediately.
    pub fn new<D>(device: &D, frames_in_flight: usize) -> RenderResult<Self>
    where
        D: RenderDevice + ?Sized,
    {
        if frames_in_flight == 0 {
            return Err(RenderError::NoFrameSlots);
        }

        let mut sync = Self { slots: Vec::new() };
        if let Err(error) = sync.populate(device, frames_in_flight) {
            sync.destroy(device);
            return Err(error);
        }

        log::debug!("Created {frames_in_flight} frame slots.");
        Ok(sync)
    }

    fn populate<D>(&mut self, device: &D, frames_in_flight: usize) -> RenderResult<()>
    where
        D: RenderDevice + ?Sized,
    {
        let command_buffers = device
            .allocate_command_buffers(frames_in_flight as u32)
            .map_err(|e| RenderError::vulkan("allocate command buffers", e))?;

        for (index, command_buffer) in command_buffers.iter().copied().enumerate() {
            match create_slot(device, index, command_buffer) {
                Ok(slot) => self.slots.push(slot),
                Err(error) => {
                    device.free_command_buffers(&command_buffers[index..]);
                    return Err(error);
                }
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    pub fn slot_index(&self, frame_index: u64) -> usize {
        (frame_index % self.slots.len() as u64) as usize
    }

    /// Blocks until the GPU has finished the previous use of the slot for
    /// `frame_index`, with no timeout.
    ///
    /// The fence is left signaled. It is reset in [`submit_and_signal`], so a
    /// frame abandoned after this wait never strands an unsignaled fence.
    ///
    /// [`submit_and_signal`]: Self::submit_and_signal
    pub fn wait_and_acquire_slot<D>(&self, device: &D, frame_index: u64) -> RenderResult<FrameSlot>
    where
        D: RenderDevice + ?Sized,
    {
        let slot = self.slots[self.slot_index(frame_index)];
        device
            .wait_for_fence(slot.in_flight)
            .map_err(|e| RenderError::vulkan("wait for in-flight fence", e))?;
        log::trace!("Frame {frame_index} acquired slot {}.", slot.index);
        Ok(slot)
    }

    /// Submits the slot's recorded command buffer. Waits on `image_available`
    /// at color attachment output; signals `render_finished` and the fence.
    pub fn submit_and_signal<D>(&self, device: &D, slot: &FrameSlot) -> RenderResult<()>
    where
        D: RenderDevice + ?Sized,
    {
        device
            .reset_fence(slot.in_flight)
            .map_err(|e| RenderError::vulkan("reset in-flight fence", e))?;
        device
            .submit(
                slot.command_buffer,
                slot.image_available,
                slot.render_finished,
                slot.in_flight,
            )
            .map_err(RenderError::submit)
    }

    /// The caller must ensure no submission from any slot is still pending.
    pub fn destroy<D>(&mut self, device: &D)
    where
        D: RenderDevice + ?Sized,
    {
        let command_buffers = self
            .slots
            .iter()
            .map(|slot| slot.command_buffer)
            .collect::<Vec<_>>();

        for slot in self.slots.drain(..) {
            device.destroy_fence(slot.in_flight);
            device.destroy_semaphore(slot.render_finished);
            device.destroy_semaphore(slot.image_available);
        }
        if !command_buffers.is_empty() {
            device.free_command_buffers(&command_buffers);
        }
    }
}

fn create_slot<D>(device: &D, index: usize, command_buffer: vk::CommandBuffer) -> RenderResult<FrameSlot>
where
    D: RenderDevice + ?Sized,
{
    let image_available = device
        .create_semaphore()
        .map_err(|e| RenderError::vulkan("create semaphore", e))?;
    let render_finished = match device.create_semaphore() {
        Ok(semaphore) => semaphore,
        Err(e) => {
            device.destroy_semaphore(image_available);
            return Err(RenderError::vulkan("create semaphore", e));
        }
    };
    let in_flight = match device.create_fence(true) {
        Ok(fence) => fence,
        Err(e) => {
            device.destroy_semaphore(render_finished);
            device.destroy_semaphore(image_available);
            return Err(RenderError::vulkan("create fence", e));
        }
    };

    Ok(FrameSlot {
        index,
        image_available,
        render_finished,
        in_flight,
        command_buffer,
    })
}
