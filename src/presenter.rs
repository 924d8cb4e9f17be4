//! The frame loop: one [`Presenter::advance_frame`] call acquires, records,
//! submits and presents a single frame, recovering from resizes and stale
//! surfaces along the way.

use vulkanalia::vk;

use crate::device::RenderDevice;
use crate::error::{RenderError, RenderResult};
use crate::recorder::{CommandRecorder, RecordInputs};
use crate::swapchain::SwapchainLifecycle;
use crate::sync::FrameSynchronizer;
use crate::window::{ResizeSignal, WindowHost};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenterState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The window reported a new drawable size.
    Resized,
    /// The previous acquire or present reported the surface as suboptimal.
    Suboptimal,
    /// Acquire reported the surface as out of date.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// Shown, but the swapchain is rebuilt at the start of the next frame.
    Suboptimal,
    /// Not shown; the swapchain was rebuilt before returning.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        frame_index: u64,
        slot: usize,
        image_index: u32,
        generation: u64,
        status: PresentStatus,
    },
    Skipped {
        frame_index: u64,
        reason: SkipReason,
    },
}

/// Counts frames that made it to present; the slot is derived, never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCursor {
    frame_index: u64,
}

impl FrameCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn slot(&self, slot_count: usize) -> usize {
        (self.frame_index % slot_count as u64) as usize
    }

    pub fn advance(&mut self) {
        self.frame_index += 1;
    }
}

/// What gets drawn every frame. Independent of the swapchain extent.
#[derive(Clone, Copy, Debug)]
pub struct DrawInputs {
    pub pipeline: vk::Pipeline,
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
    pub clear_color: [f32; 4],
}

pub struct Presenter {
    swapchain: SwapchainLifecycle,
    sync: FrameSynchronizer,
    recorder: CommandRecorder,
    draw: DrawInputs,
    cursor: FrameCursor,
    resize: ResizeSignal,
    stale: bool,
    state: PresenterState,
}

impl Presenter {
    pub fn new(
        swapchain: SwapchainLifecycle,
        sync: FrameSynchronizer,
        draw: DrawInputs,
        resize: ResizeSignal,
    ) -> Self {
        Self {
            swapchain,
            sync,
            recorder: CommandRecorder,
            draw,
            cursor: FrameCursor::new(),
            resize,
            stale: false,
            state: PresenterState::Idle,
        }
    }

    pub fn state(&self) -> PresenterState {
        self.state
    }

    pub fn frame_index(&self) -> u64 {
        self.cursor.frame_index()
    }

    pub fn swapchain(&self) -> &SwapchainLifecycle {
        &self.swapchain
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.sync
    }

    /// Runs one full Idle → Acquiring → Recording → Submitted → Presenting →
    /// Idle cycle on the calling thread.
    ///
    /// Stale surfaces and resizes are handled here and reported through the
    /// returned [`FrameOutcome`]; every `Err` is fatal. On error the presenter
    /// stays in the state that failed.
    pub fn advance_frame<D, H>(&mut self, device: &D, host: &mut H) -> RenderResult<FrameOutcome>
    where
        D: RenderDevice + ?Sized,
        H: WindowHost + ?Sized,
    {
        let frame_index = self.cursor.frame_index();
        self.state = PresenterState::Acquiring;

        let resized = self.resize.take();
        let stale = std::mem::take(&mut self.stale);
        if resized || stale {
            let reason = if resized {
                SkipReason::Resized
            } else {
                SkipReason::Suboptimal
            };
            log::debug!("Frame {frame_index}: rebuilding swapchain ({reason:?}).");
            self.rebuild(device, host)?;
            self.state = PresenterState::Idle;
            return Ok(FrameOutcome::Skipped {
                frame_index,
                reason,
            });
        }

        let slot = self.sync.wait_and_acquire_slot(device, frame_index)?;

        let acquired = device.acquire_next_image(self.swapchain.state().handle(), slot.image_available);
        let image_index = match acquired {
            Ok((image_index, vk::SuccessCode::SUBOPTIMAL_KHR)) => {
                log::debug!("Frame {frame_index}: acquire reported a suboptimal surface.");
                self.stale = true;
                image_index
            }
            Ok((image_index, _)) => image_index,
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => {
                log::warn!("Frame {frame_index}: surface out of date on acquire.");
                self.rebuild(device, host)?;
                self.state = PresenterState::Idle;
                return Ok(FrameOutcome::Skipped {
                    frame_index,
                    reason: SkipReason::OutOfDate,
                });
            }
            Err(e) => return Err(RenderError::acquire(e)),
        };

        self.state = PresenterState::Recording;
        let swapchain = self.swapchain.state();
        let generation = swapchain.generation();
        let inputs = RecordInputs {
            command_buffer: slot.command_buffer,
            pipeline: self.draw.pipeline,
            render_pass: self.swapchain.render_pass(),
            framebuffer: swapchain.framebuffer(image_index)?,
            extent: swapchain.extent(),
            vertex_buffer: self.draw.vertex_buffer,
            vertex_count: self.draw.vertex_count,
            clear_color: self.draw.clear_color,
        };
        self.recorder.record(device, &inputs)?;

        self.state = PresenterState::Submitted;
        self.sync.submit_and_signal(device, &slot)?;

        self.state = PresenterState::Presenting;
        let presented = device.present(
            self.swapchain.state().handle(),
            image_index,
            slot.render_finished,
        );
        let status = match presented {
            Ok(vk::SuccessCode::SUBOPTIMAL_KHR) => {
                log::debug!("Frame {frame_index}: present reported a suboptimal surface.");
                self.stale = true;
                PresentStatus::Suboptimal
            }
            Ok(_) => PresentStatus::Optimal,
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => {
                log::warn!("Frame {frame_index}: surface out of date on present.");
                self.rebuild(device, host)?;
                PresentStatus::OutOfDate
            }
            Err(e) => return Err(RenderError::present(e)),
        };

        self.cursor.advance();
        self.state = PresenterState::Idle;
        log::trace!(
            "Frame {frame_index} presented image {image_index} from slot {} ({status:?}).",
            slot.index
        );

        Ok(FrameOutcome::Presented {
            frame_index,
            slot: slot.index,
            image_index,
            generation,
            status,
        })
    }

    /// A successful rebuild settles any pending suboptimal report.
    fn rebuild<D, H>(&mut self, device: &D, host: &mut H) -> RenderResult<()>
    where
        D: RenderDevice + ?Sized,
        H: WindowHost + ?Sized,
    {
        if self.swapchain.recreate(device, host)? {
            self.stale = false;
        }
        Ok(())
    }

    /// Waits for the GPU to go idle, then releases frame slots and the
    /// swapchain. Pipeline, render pass and vertex buffer belong to the caller.
    pub fn destroy<D>(mut self, device: &D) -> RenderResult<()>
    where
        D: RenderDevice + ?Sized,
    {
        let idle = device
            .wait_idle()
            .map_err(|e| RenderError::vulkan("wait for device idle", e));
        self.sync.destroy(device);
        self.swapchain.destroy(device);
        idle
    }
}
